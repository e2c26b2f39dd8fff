//! Explicit track state.
//!
//! A track is `Idle` until something asks for media, `Loading` while the single load
//! task runs, then `Loaded` (with a playback sub-state) or `Failed`. Requests that
//! arrive while loading are remembered in [`PendingRequests`] and replayed once.

use audio_track_types::{LoadPhase, PlaybackState, TrackEvent, TrackStatus};

use crate::error::HostResult;
use crate::graph::NodeGraph;

/// A pause or stop requested before the track could play.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Halt {
    Pause,
    Stop,
}

impl Halt {
    pub(crate) fn event(self) -> TrackEvent {
        match self {
            Halt::Pause => TrackEvent::Pause,
            Halt::Stop => TrackEvent::Stop,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PendingRequests {
    /// `play()` calls since loading began; any non-zero count replays as one play.
    pub(crate) plays: u32,
    /// Latest halt requested after a play; cleared by a later play.
    pub(crate) halt: Option<Halt>,
}

impl PendingRequests {
    pub(crate) fn queue_play(&mut self) {
        self.plays += 1;
        self.halt = None;
    }

    /// Remember `halt` only when something will start playback first.
    pub(crate) fn queue_halt(&mut self, halt: Halt, autoplay: bool) {
        if self.plays > 0 || autoplay {
            self.halt = Some(halt);
        }
    }
}

pub(crate) enum TrackState {
    Idle,
    Loading(PendingRequests),
    Loaded(LoadedTrack),
    Failed { reason: String },
}

impl TrackState {
    pub(crate) fn phase(&self) -> LoadPhase {
        match self {
            TrackState::Idle => LoadPhase::Idle,
            TrackState::Loading(_) => LoadPhase::Loading,
            TrackState::Loaded(_) => LoadPhase::Loaded,
            TrackState::Failed { .. } => LoadPhase::Failed,
        }
    }

    pub(crate) fn snapshot(&self, now: f64) -> TrackStatus {
        let phase = self.phase();
        let mut status = TrackStatus {
            phase,
            loading: phase == LoadPhase::Loading,
            loaded: phase == LoadPhase::Loaded,
            ..TrackStatus::default()
        };
        match self {
            TrackState::Idle => {}
            TrackState::Loading(pending) => status.pending_plays = pending.plays,
            TrackState::Loaded(loaded) => {
                status.playback = loaded.playback();
                status.position_ms = Some(seconds_to_ms(loaded.position(now)));
                status.duration_ms = loaded.duration().map(seconds_to_ms);
            }
            TrackState::Failed { reason } => status.error = Some(reason.clone()),
        }
        status
    }
}

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// A track whose graph exists, with its playback position bookkeeping.
///
/// `offset` is the media position at the last start or halt; while playing the
/// position advances with the host clock from `started_at`.
///
/// Until `canplaythrough` has been announced, play and halt requests are `held`
/// instead of touching the source.
pub(crate) struct LoadedTrack {
    graph: NodeGraph,
    playback: PlaybackState,
    offset: f64,
    started_at: f64,
    duration: Option<f64>,
    held: Option<PendingRequests>,
}

impl LoadedTrack {
    pub(crate) fn new(graph: NodeGraph, duration: Option<f64>) -> Self {
        Self {
            graph,
            playback: PlaybackState::Stopped,
            offset: 0.0,
            started_at: 0.0,
            duration,
            held: None,
        }
    }

    /// Keep queueing requests into `pending` until [`LoadedTrack::release`].
    pub(crate) fn hold(&mut self, pending: PendingRequests) {
        self.held = Some(pending);
    }

    pub(crate) fn held_mut(&mut self) -> Option<&mut PendingRequests> {
        self.held.as_mut()
    }

    pub(crate) fn release(&mut self) -> Option<PendingRequests> {
        self.held.take()
    }

    pub(crate) fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub(crate) fn playback(&self) -> PlaybackState {
        self.playback
    }

    pub(crate) fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Media position in seconds at host time `now`.
    pub(crate) fn position(&self, now: f64) -> f64 {
        match self.playback {
            PlaybackState::Playing => self.clamp(self.offset + (now - self.started_at)),
            PlaybackState::Stopped | PlaybackState::Paused => self.offset,
        }
    }

    /// Start (or resume) the source. `Ok(false)` when already playing.
    pub(crate) fn start(&mut self, now: f64) -> HostResult<bool> {
        if self.playback == PlaybackState::Playing {
            return Ok(false);
        }
        self.graph.source().start(now, self.offset)?;
        self.playback = PlaybackState::Playing;
        self.started_at = now;
        Ok(true)
    }

    /// Stop the source and remember the position. `Ok(false)` unless playing.
    pub(crate) fn pause(&mut self, now: f64) -> HostResult<bool> {
        if self.playback != PlaybackState::Playing {
            return Ok(false);
        }
        self.graph.source().stop(now)?;
        self.offset = self.position(now);
        self.playback = PlaybackState::Paused;
        Ok(true)
    }

    /// Stop the source and rewind. `Ok(false)` unless playing.
    pub(crate) fn stop(&mut self, now: f64) -> HostResult<bool> {
        if self.playback != PlaybackState::Playing {
            return Ok(false);
        }
        self.graph.source().stop(now)?;
        self.offset = 0.0;
        self.playback = PlaybackState::Stopped;
        Ok(true)
    }

    fn clamp(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);
        match self.duration {
            Some(duration) => seconds.min(duration),
            None => seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffer;
    use crate::graph::{Mix, NodeGraphBuilder};
    use crate::host::{HostAudioAdapter, SourceInput};
    use crate::test_support::MockContext;
    use std::sync::Arc;

    fn loaded(ctx: &Arc<MockContext>, seconds: usize) -> LoadedTrack {
        let adapter = HostAudioAdapter::new(ctx.clone()).unwrap();
        let buffer = AudioBuffer::new(8_000, 1, vec![0.0; seconds * 8_000]);
        let duration = buffer.duration().as_secs_f64();
        let source = adapter.create_source(SourceInput::Buffer(buffer)).unwrap();
        let graph = NodeGraphBuilder::build(&adapter, source, Mix::default()).unwrap();
        LoadedTrack::new(graph, Some(duration))
    }

    #[test]
    fn second_start_is_a_noop() {
        let ctx = MockContext::unprefixed();
        let mut track = loaded(&ctx, 10);
        assert_eq!(track.start(0.0), Ok(true));
        assert_eq!(track.start(1.0), Ok(false));
        assert_eq!(ctx.start_offsets(), vec![0.0]);
    }

    #[test]
    fn pause_keeps_position_and_resume_continues() {
        let ctx = MockContext::unprefixed();
        let mut track = loaded(&ctx, 10);
        track.start(1.0).unwrap();
        assert_eq!(track.pause(3.5), Ok(true));
        assert_eq!(track.playback(), PlaybackState::Paused);
        assert_eq!(track.position(100.0), 2.5);

        track.start(10.0).unwrap();
        assert_eq!(track.position(11.0), 3.5);
        assert_eq!(ctx.start_offsets(), vec![0.0, 2.5]);
    }

    #[test]
    fn stop_rewinds() {
        let ctx = MockContext::unprefixed();
        let mut track = loaded(&ctx, 10);
        track.start(0.0).unwrap();
        assert_eq!(track.stop(4.0), Ok(true));
        assert_eq!(track.playback(), PlaybackState::Stopped);
        assert_eq!(track.position(9.0), 0.0);
    }

    #[test]
    fn halts_outside_playing_are_noops() {
        let ctx = MockContext::unprefixed();
        let mut track = loaded(&ctx, 10);
        assert_eq!(track.pause(0.0), Ok(false));
        assert_eq!(track.stop(0.0), Ok(false));

        track.start(0.0).unwrap();
        track.pause(1.0).unwrap();
        assert_eq!(track.stop(2.0), Ok(false));
        assert_eq!(track.position(2.0), 1.0);
        assert_eq!(ctx.stops(), 1);
    }

    #[test]
    fn held_requests_queue_until_released() {
        let ctx = MockContext::unprefixed();
        let mut track = loaded(&ctx, 10);
        track.hold(PendingRequests::default());
        if let Some(held) = track.held_mut() {
            held.queue_halt(Halt::Stop, false);
            held.queue_play();
            held.queue_play();
            held.queue_halt(Halt::Pause, false);
        }
        assert_eq!(
            track.release(),
            Some(PendingRequests {
                plays: 2,
                halt: Some(Halt::Pause),
            })
        );
        assert!(track.held_mut().is_none());
        assert!(ctx.start_offsets().is_empty());
    }

    #[test]
    fn halt_without_play_is_kept_only_for_autoplay() {
        let mut pending = PendingRequests::default();
        pending.queue_halt(Halt::Pause, false);
        assert_eq!(pending.halt, None);
        pending.queue_halt(Halt::Pause, true);
        assert_eq!(pending.halt, Some(Halt::Pause));
        pending.queue_play();
        assert_eq!(pending.halt, None);
    }

    #[test]
    fn position_is_clamped_to_duration() {
        let ctx = MockContext::unprefixed();
        let mut track = loaded(&ctx, 2);
        track.start(0.0).unwrap();
        assert_eq!(track.position(30.0), 2.0);
    }

    #[test]
    fn snapshot_reports_each_phase() {
        let idle = TrackState::Idle.snapshot(0.0);
        assert_eq!(idle.phase, LoadPhase::Idle);
        assert!(!idle.loading && !idle.loaded);

        let loading = TrackState::Loading(PendingRequests {
            plays: 3,
            halt: None,
        })
        .snapshot(0.0);
        assert!(loading.loading);
        assert_eq!(loading.pending_plays, 3);

        let ctx = MockContext::unprefixed();
        let mut track = loaded(&ctx, 10);
        track.start(0.0).unwrap();
        let status = TrackState::Loaded(track).snapshot(1.25);
        assert!(status.loaded);
        assert_eq!(status.playback, PlaybackState::Playing);
        assert_eq!(status.position_ms, Some(1_250));
        assert_eq!(status.duration_ms, Some(10_000));

        let failed = TrackState::Failed {
            reason: "boom".to_string(),
        }
        .snapshot(0.0);
        assert_eq!(failed.phase, LoadPhase::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
