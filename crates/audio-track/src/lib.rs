//! Audio track lifecycle over a pluggable audio-graph host.
//!
//! A [`Track`] fetches, attaches or wraps its media once, builds a
//! `source → gain → pan → destination` chain through a [`HostAudioAdapter`] and
//! announces progress on its [`EventBus`]. `play()` may be called at any time; calls
//! made before the chain exists are coalesced into a single start.

pub mod buffer;
pub mod config;
pub mod decode;
pub mod element;
pub mod error;
pub mod events;
pub mod fetch;
pub mod graph;
pub mod headless;
pub mod host;
pub mod nodes;
mod state;
pub mod track;

#[cfg(test)]
mod test_support;

pub use audio_track_types::{LoadPhase, PlaybackState, SourceMode, TrackEvent, TrackStatus};
pub use error::{HostError, HostResult, TrackError};
pub use events::{EventBus, SubscriptionId};
pub use host::{Dialect, HostAudioAdapter};
pub use track::{Track, TrackOptions, TrackSource};
