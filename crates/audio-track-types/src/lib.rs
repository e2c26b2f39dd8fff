use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Strategy a track uses to obtain playable media.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Fetch the whole file and decode it into an in-memory buffer.
    #[default]
    Buffer,
    /// Attach the media to a DOM-like element and let it stream.
    Element,
    /// Wrap a live stream handle directly.
    Stream,
}

impl SourceMode {
    pub const ALL: [SourceMode; 3] = [SourceMode::Buffer, SourceMode::Element, SourceMode::Stream];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceMode::Buffer => "buffer",
            SourceMode::Element => "element",
            SourceMode::Stream => "stream",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownName {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} `{}`", self.kind, self.value)
    }
}

impl std::error::Error for UnknownName {}

impl FromStr for SourceMode {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "source mode",
                value: s.to_string(),
            })
    }
}

/// Notifications a track publishes on its event bus.
///
/// The lowercase names match the media-element event vocabulary.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackEvent {
    LoadStart,
    LoadedMetadata,
    CanPlay,
    CanPlayThrough,
    Play,
    Pause,
    Stop,
    Error,
}

impl TrackEvent {
    pub const ALL: [TrackEvent; 8] = [
        TrackEvent::LoadStart,
        TrackEvent::LoadedMetadata,
        TrackEvent::CanPlay,
        TrackEvent::CanPlayThrough,
        TrackEvent::Play,
        TrackEvent::Pause,
        TrackEvent::Stop,
        TrackEvent::Error,
    ];

    /// Lifecycle events of one successful load, in emission order.
    pub const LOAD_SEQUENCE: [TrackEvent; 4] = [
        TrackEvent::LoadStart,
        TrackEvent::LoadedMetadata,
        TrackEvent::CanPlay,
        TrackEvent::CanPlayThrough,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackEvent::LoadStart => "loadstart",
            TrackEvent::LoadedMetadata => "loadedmetadata",
            TrackEvent::CanPlay => "canplay",
            TrackEvent::CanPlayThrough => "canplaythrough",
            TrackEvent::Play => "play",
            TrackEvent::Pause => "pause",
            TrackEvent::Stop => "stop",
            TrackEvent::Error => "error",
        }
    }
}

impl fmt::Display for TrackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackEvent {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrackEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "track event",
                value: s.to_string(),
            })
    }
}

/// Load progress of a track.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// Fetch, decode or attach in flight.
    Loading,
    /// Node graph built and connected.
    Loaded,
    /// Load failed; the track will not retry.
    Failed,
}

impl LoadPhase {
    /// `true` once the load can no longer change.
    pub fn is_settled(self) -> bool {
        matches!(self, LoadPhase::Loaded | LoadPhase::Failed)
    }
}

/// Playback sub-state, meaningful only once loaded.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Point-in-time view of a track.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackStatus {
    /// Current load phase.
    pub phase: LoadPhase,
    /// `true` while the load sequence is in flight.
    pub loading: bool,
    /// `true` once the node graph exists; never reverts.
    pub loaded: bool,
    /// Playback sub-state (always `stopped` before load).
    pub playback: PlaybackState,
    /// `play()` calls received while loading.
    pub pending_plays: u32,
    /// Playback position in milliseconds.
    pub position_ms: Option<u64>,
    /// Media duration in milliseconds when known (buffer mode only).
    pub duration_ms: Option<u64>,
    /// Failure reason when `phase` is `failed`.
    pub error: Option<String>,
}
