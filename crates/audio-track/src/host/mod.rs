//! Host audio engine boundary.
//!
//! A host context is the external engine that owns node creation and the final output.
//! Hosts come in two dialects that expose the same capabilities under different
//! primitives:
//! - **unprefixed**: `createGain` + callback-style `decodeAudioData`
//! - **prefixed** (legacy): `createGainNode` + synchronous `createBuffer`
//!
//! [`AudioContext`] is the union of both. A host reports what it implements through
//! [`AudioContext::supports`]; primitives it lacks keep their default body, which fails
//! with [`HostError::Missing`]. [`HostAudioAdapter`] probes once and hides the difference.

mod adapter;

pub use adapter::{Dialect, HostAudioAdapter, SourceInput};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::buffer::AudioBuffer;
use crate::element::MediaElement;
use crate::error::{HostError, HostResult};

/// Named host primitives, used for capability detection and error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    CreateGain,
    CreateGainNode,
    CreatePanner,
    CreateBufferSource,
    CreateMediaElementSource,
    CreateMediaStreamSource,
    DecodeAudioData,
    CreateBuffer,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::CreateGain => "createGain",
            Primitive::CreateGainNode => "createGainNode",
            Primitive::CreatePanner => "createPanner",
            Primitive::CreateBufferSource => "createBufferSource",
            Primitive::CreateMediaElementSource => "createMediaElementSource",
            Primitive::CreateMediaStreamSource => "createMediaStreamSource",
            Primitive::DecodeAudioData => "decodeAudioData",
            Primitive::CreateBuffer => "createBuffer",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host-assigned node identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Automatable node parameters the track drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioParam {
    /// Linear gain on a gain node.
    Gain,
    /// Horizontal position on a panner, `-1.0` (left) to `1.0` (right).
    Pan,
}

/// A host-native processing node.
pub trait AudioNode: Send + Sync {
    fn id(&self) -> NodeId;

    /// Route this node's output into `target`.
    fn connect(&self, target: &dyn AudioNode) -> HostResult<()>;

    fn set_param(&self, param: AudioParam, _value: f32) -> HostResult<()> {
        Err(HostError::Node(format!("node {:?} has no {param:?} parameter", self.id())))
    }
}

/// A host-native node that produces sound.
///
/// Sources in this model are restartable: `stop` followed by `start` at an offset resumes
/// the same node.
pub trait AudioSourceNode: AudioNode {
    /// View as a plain node, for connecting.
    fn as_node(&self) -> &dyn AudioNode;

    /// Begin output at host time `when`, `offset` seconds into the media.
    fn start(&self, when: f64, offset: f64) -> HostResult<()>;

    /// Halt output at host time `when`.
    fn stop(&self, when: f64) -> HostResult<()>;

    /// Attach decoded media (buffer sources only).
    fn set_buffer(&self, _buffer: AudioBuffer) -> HostResult<()> {
        Err(HostError::Node(format!(
            "source {:?} does not accept buffers",
            self.id()
        )))
    }
}

/// Callback handed to `decodeAudioData`.
pub type DecodeCallback = Box<dyn FnOnce(HostResult<AudioBuffer>) + Send + 'static>;

/// Opaque live-stream handle passed through to the host.
#[derive(Clone)]
pub struct MediaStream {
    label: String,
    handle: Arc<dyn Any + Send + Sync>,
}

impl MediaStream {
    pub fn new(label: impl Into<String>, handle: impl Any + Send + Sync) -> Self {
        Self {
            label: label.into(),
            handle: Arc::new(handle),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Recover the host-specific stream object.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream").field("label", &self.label).finish()
    }
}

/// External audio engine instance, shared by every track that uses it.
///
/// Implementors override the primitives of their dialect and report them from
/// [`supports`](AudioContext::supports).
pub trait AudioContext: Send + Sync {
    fn supports(&self, primitive: Primitive) -> bool;

    fn create_gain(&self) -> HostResult<Arc<dyn AudioNode>> {
        Err(HostError::Missing(Primitive::CreateGain))
    }

    fn create_gain_node(&self) -> HostResult<Arc<dyn AudioNode>> {
        Err(HostError::Missing(Primitive::CreateGainNode))
    }

    fn create_panner(&self) -> HostResult<Arc<dyn AudioNode>> {
        Err(HostError::Missing(Primitive::CreatePanner))
    }

    fn create_buffer_source(&self) -> HostResult<Arc<dyn AudioSourceNode>> {
        Err(HostError::Missing(Primitive::CreateBufferSource))
    }

    fn create_media_element_source(
        &self,
        _element: Arc<dyn MediaElement>,
    ) -> HostResult<Arc<dyn AudioSourceNode>> {
        Err(HostError::Missing(Primitive::CreateMediaElementSource))
    }

    fn create_media_stream_source(
        &self,
        _stream: &MediaStream,
    ) -> HostResult<Arc<dyn AudioSourceNode>> {
        Err(HostError::Missing(Primitive::CreateMediaStreamSource))
    }

    /// Unprefixed decode: completes through `callback`, possibly on another thread.
    fn decode_audio_data(&self, _data: Vec<u8>, callback: DecodeCallback) {
        callback(Err(HostError::Missing(Primitive::DecodeAudioData)));
    }

    /// Prefixed decode: builds the buffer synchronously.
    fn create_buffer(&self, _data: &[u8]) -> HostResult<AudioBuffer> {
        Err(HostError::Missing(Primitive::CreateBuffer))
    }

    /// Final output node.
    fn destination(&self) -> Arc<dyn AudioNode>;

    /// Host clock in seconds.
    fn current_time(&self) -> f64;
}
