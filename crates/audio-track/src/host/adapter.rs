use std::fmt;
use std::sync::Arc;

use audio_track_types::SourceMode;
use tokio::sync::oneshot;

use super::{AudioContext, MediaStream, Primitive};
use crate::buffer::AudioBuffer;
use crate::element::MediaElement;
use crate::error::{HostError, HostResult, TrackError};
use crate::nodes::{Destination, GainNode, PanNode2D, SourceNode};

/// Host dialect chosen at adapter creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// `createGain` + callback `decodeAudioData`.
    Unprefixed,
    /// `createGainNode` + synchronous `createBuffer`.
    Prefixed,
}

impl Dialect {
    /// Primitives a host must implement to be driven in this dialect.
    pub fn required_primitives(self) -> [Primitive; 4] {
        match self {
            Dialect::Unprefixed => [
                Primitive::CreateGain,
                Primitive::DecodeAudioData,
                Primitive::CreatePanner,
                Primitive::CreateBufferSource,
            ],
            Dialect::Prefixed => [
                Primitive::CreateGainNode,
                Primitive::CreateBuffer,
                Primitive::CreatePanner,
                Primitive::CreateBufferSource,
            ],
        }
    }
}

/// Media handed to [`HostAudioAdapter::create_source`].
pub enum SourceInput {
    Buffer(AudioBuffer),
    Element(Arc<dyn MediaElement>),
    Stream(MediaStream),
}

impl SourceInput {
    pub fn mode(&self) -> SourceMode {
        match self {
            SourceInput::Buffer(_) => SourceMode::Buffer,
            SourceInput::Element(_) => SourceMode::Element,
            SourceInput::Stream(_) => SourceMode::Stream,
        }
    }
}

/// One capability interface over either host dialect.
///
/// The dialect is detected once in [`HostAudioAdapter::new`]; every later call
/// dispatches on the stored choice instead of probing the host again.
#[derive(Clone)]
pub struct HostAudioAdapter {
    context: Arc<dyn AudioContext>,
    dialect: Dialect,
}

impl fmt::Debug for HostAudioAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAudioAdapter")
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

impl HostAudioAdapter {
    /// Detect the dialect of `context`.
    ///
    /// Fails with [`TrackError::UnsupportedHostCapability`] when neither dialect's
    /// primitives are all present.
    pub fn new(context: Arc<dyn AudioContext>) -> Result<Self, TrackError> {
        let supported = |dialect: Dialect| {
            dialect
                .required_primitives()
                .iter()
                .all(|p| context.supports(*p))
        };

        let dialect = if supported(Dialect::Unprefixed) {
            Dialect::Unprefixed
        } else if supported(Dialect::Prefixed) {
            Dialect::Prefixed
        } else {
            let missing: Vec<&str> = Dialect::Unprefixed
                .required_primitives()
                .iter()
                .filter(|p| !context.supports(**p))
                .map(|p| p.name())
                .collect();
            return Err(TrackError::UnsupportedHostCapability(format!(
                "host implements neither audio dialect (missing {})",
                missing.join(", ")
            )));
        };

        tracing::info!(dialect = ?dialect, "host dialect selected");
        Ok(Self { context, dialect })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn context(&self) -> &Arc<dyn AudioContext> {
        &self.context
    }

    /// Check that the host can build a source for `mode`.
    pub fn require_source_mode(&self, mode: SourceMode) -> Result<(), TrackError> {
        let primitive = match mode {
            SourceMode::Buffer => Primitive::CreateBufferSource,
            SourceMode::Element => Primitive::CreateMediaElementSource,
            SourceMode::Stream => Primitive::CreateMediaStreamSource,
        };
        if self.context.supports(primitive) {
            Ok(())
        } else {
            Err(TrackError::UnsupportedHostCapability(format!(
                "{mode} sources need `{primitive}`"
            )))
        }
    }

    pub fn create_gain_node(&self) -> HostResult<GainNode> {
        let node = match self.dialect {
            Dialect::Unprefixed => self.context.create_gain()?,
            Dialect::Prefixed => self.context.create_gain_node()?,
        };
        Ok(GainNode::new(node))
    }

    /// Both dialects share the `createPanner` name.
    pub fn create_pan_node(&self) -> HostResult<PanNode2D> {
        Ok(PanNode2D::new(self.context.create_panner()?))
    }

    /// Build the source primitive appropriate to `input`.
    pub fn create_source(&self, input: SourceInput) -> HostResult<SourceNode> {
        let mode = input.mode();
        let node = match input {
            SourceInput::Buffer(buffer) => {
                let node = self.context.create_buffer_source()?;
                node.set_buffer(buffer)?;
                node
            }
            SourceInput::Element(element) => self.context.create_media_element_source(element)?,
            SourceInput::Stream(stream) => self.context.create_media_stream_source(&stream)?,
        };
        Ok(SourceNode::new(node, mode))
    }

    /// Decode raw media bytes into a playable buffer.
    ///
    /// Always awaitable: the unprefixed callback is bridged through a oneshot channel and
    /// the prefixed synchronous construction resolves immediately.
    pub async fn decode(&self, data: Vec<u8>) -> HostResult<AudioBuffer> {
        match self.dialect {
            Dialect::Unprefixed => {
                let (tx, rx) = oneshot::channel();
                self.context.decode_audio_data(
                    data,
                    Box::new(move |result| {
                        let _ = tx.send(result);
                    }),
                );
                rx.await.map_err(|_| HostError::DecodeDropped)?
            }
            Dialect::Prefixed => self.context.create_buffer(&data),
        }
    }

    pub fn destination(&self) -> Destination {
        Destination::new(self.context.destination())
    }

    pub fn current_time(&self) -> f64 {
        self.context.current_time()
    }
}
