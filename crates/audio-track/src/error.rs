//! Error types for track construction, host calls and loading.
//!
//! Configuration mistakes fail construction synchronously. Load-time failures never
//! cross the `play()` boundary; they are reported through the track's event bus and
//! returned only from [`Track::ready`](crate::Track::ready).

use thiserror::Error;

use crate::host::Primitive;

/// Failures visible to the owner of a track.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackError {
    /// Missing context or source, unknown source mode, or otherwise unusable options.
    #[error("invalid track config: {0}")]
    InvalidTrackConfig(String),
    /// The host context does not implement a primitive this track needs.
    #[error("unsupported host capability: {0}")]
    UnsupportedHostCapability(String),
    /// Fetch, decode or attach failed. Loads are single-shot per track.
    #[error("load failed: {0}")]
    LoadFailed(String),
}

impl TrackError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TrackError::InvalidTrackConfig(msg.into())
    }
}

/// Failures reported by a host audio engine primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// The primitive does not exist in this host dialect.
    #[error("host primitive `{0}` is not available")]
    Missing(Primitive),
    /// The host could not turn raw bytes into a buffer.
    #[error("decode failed: {0}")]
    Decode(String),
    /// The host dropped a decode callback without invoking it.
    #[error("decode callback was dropped before completion")]
    DecodeDropped,
    /// Any other node-level failure (bad connection, stopped node, ...).
    #[error("{0}")]
    Node(String),
}

pub type HostResult<T> = Result<T, HostError>;
