//! DOM-like media element contract used by element-mode tracks.
//!
//! The element streams media on its own; the track only attaches a source, waits for
//! the element's readiness notification and hands the element to the host.

use std::sync::Arc;

/// Notifications an element raises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementEvent {
    /// Enough media is buffered to play to the end.
    CanPlayThrough,
    /// The element failed to load its source.
    Error,
}

/// Registration token returned by [`MediaElement::add_event_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

pub type ElementListener = Arc<dyn Fn() + Send + Sync>;

pub trait MediaElement: Send + Sync {
    /// Point the element at `src` and begin loading.
    fn set_src(&self, src: &str);

    fn add_event_listener(&self, event: ElementEvent, listener: ElementListener) -> ListenerId;

    fn remove_event_listener(&self, event: ElementEvent, id: ListenerId);

    fn play(&self);

    fn pause(&self);
}

/// Creates elements on demand (the `createElement('audio')` collaborator).
pub trait MediaElementFactory: Send + Sync {
    fn create_media_element(&self) -> Arc<dyn MediaElement>;
}
