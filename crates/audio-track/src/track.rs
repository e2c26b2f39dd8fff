//! The track lifecycle state machine.
//!
//! A [`Track`] owns one source, one node graph (built once) and one event bus. Its
//! public operations are synchronous: anything that needs the media waits for the
//! single load task, which runs on the tokio runtime the track was created on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, bail};
use audio_track_types::{LoadPhase, SourceMode, TrackEvent, TrackStatus};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use crate::config::TrackSettings;
use crate::element::{ElementEvent, ElementListener, MediaElementFactory};
use crate::error::{HostError, HostResult, TrackError};
use crate::events::{EventBus, EventHandler, SubscriptionId};
use crate::fetch::{DefaultFetcher, MediaFetcher};
use crate::graph::{Mix, NodeGraphBuilder};
use crate::host::{AudioContext, HostAudioAdapter, MediaStream, SourceInput};
use crate::nodes::{GraphNode, SourceNode};
use crate::state::{Halt, LoadedTrack, PendingRequests, TrackState};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Where a track's media comes from.
#[derive(Clone, Debug)]
pub enum TrackSource {
    /// Path or URL, for buffer and element modes.
    Url(String),
    /// Live stream handle, for stream mode.
    Stream(MediaStream),
}

impl From<&str> for TrackSource {
    fn from(src: &str) -> Self {
        TrackSource::Url(src.to_string())
    }
}

impl From<String> for TrackSource {
    fn from(src: String) -> Self {
        TrackSource::Url(src)
    }
}

impl From<MediaStream> for TrackSource {
    fn from(stream: MediaStream) -> Self {
        TrackSource::Stream(stream)
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::Url(src) => f.write_str(src),
            TrackSource::Stream(stream) => write!(f, "stream:{}", stream.label()),
        }
    }
}

/// Construction options, validated by [`Track::new`].
pub struct TrackOptions {
    pub src: Option<TrackSource>,
    pub context: Option<Arc<dyn AudioContext>>,
    /// `buffer` (default), `element` or `stream`.
    pub source_mode: Option<String>,
    pub autoplay: bool,
    pub volume: f32,
    pub pan: f32,
    /// Defaults to [`DefaultFetcher`].
    pub fetcher: Option<Arc<dyn MediaFetcher>>,
    /// Required for element mode.
    pub element_factory: Option<Arc<dyn MediaElementFactory>>,
    /// Subscribed before any load can start, so autoplay tracks report every event.
    pub handlers: Vec<(TrackEvent, EventHandler)>,
}

impl Default for TrackOptions {
    fn default() -> Self {
        let mix = Mix::default();
        Self {
            src: None,
            context: None,
            source_mode: None,
            autoplay: false,
            volume: mix.volume,
            pan: mix.pan,
            fetcher: None,
            element_factory: None,
            handlers: Vec::new(),
        }
    }
}

impl TrackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options seeded from a settings file; `src` and `context` are still required.
    pub fn from_settings(settings: &TrackSettings) -> anyhow::Result<Self> {
        Ok(Self {
            source_mode: Some(settings.source_mode.clone()),
            autoplay: settings.autoplay,
            volume: settings.volume,
            pan: settings.pan,
            fetcher: Some(Arc::new(DefaultFetcher::from_settings(&settings.fetch)?)),
            ..Self::default()
        })
    }

    pub fn src(mut self, src: impl Into<TrackSource>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn context(mut self, context: Arc<dyn AudioContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn source_mode(mut self, mode: impl Into<String>) -> Self {
        self.source_mode = Some(mode.into());
        self
    }

    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn element_factory(mut self, factory: Arc<dyn MediaElementFactory>) -> Self {
        self.element_factory = Some(factory);
        self
    }

    /// Like [`Track::on`], registered by [`Track::new`] before it can start loading.
    pub fn on<F>(mut self, event: TrackEvent, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers.push((event, Arc::new(handler)));
        self
    }
}

fn validate_volume(volume: f32) -> Result<(), TrackError> {
    if volume.is_finite() && volume >= 0.0 {
        Ok(())
    } else {
        Err(TrackError::config(format!("volume {volume} must be finite and >= 0")))
    }
}

fn validate_pan(pan: f32) -> Result<(), TrackError> {
    if pan.is_finite() && (-1.0..=1.0).contains(&pan) {
        Ok(())
    } else {
        Err(TrackError::config(format!("pan {pan} must be within [-1, 1]")))
    }
}

/// A playable audio source bound to a host context.
///
/// Cloning yields another handle to the same track.
#[derive(Clone)]
pub struct Track {
    inner: Arc<Inner>,
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("src", &self.inner.source)
            .finish_non_exhaustive()
    }
}

impl Track {
    /// Validate `options` and create an idle track.
    ///
    /// Must be called inside a tokio runtime; the load task is spawned on it later.
    /// With `autoplay` set the load starts immediately.
    pub fn new(options: TrackOptions) -> Result<Self, TrackError> {
        let TrackOptions {
            src,
            context,
            source_mode,
            autoplay,
            volume,
            pan,
            fetcher,
            element_factory,
            handlers,
        } = options;

        let context = context.ok_or_else(|| TrackError::config("missing host context"))?;
        let source = src.ok_or_else(|| TrackError::config("missing src"))?;
        if matches!(&source, TrackSource::Url(url) if url.is_empty()) {
            return Err(TrackError::config("missing src"));
        }

        let mode = match source_mode.as_deref() {
            None => SourceMode::default(),
            Some(name) => name
                .parse::<SourceMode>()
                .map_err(|e| TrackError::config(e.to_string()))?,
        };
        match (mode, &source) {
            (SourceMode::Stream, TrackSource::Stream(_))
            | (SourceMode::Buffer | SourceMode::Element, TrackSource::Url(_)) => {}
            (SourceMode::Stream, TrackSource::Url(_)) => {
                return Err(TrackError::config("stream mode needs a stream handle"));
            }
            (_, TrackSource::Stream(_)) => {
                return Err(TrackError::config(format!("{mode} mode needs a url")));
            }
        }
        if mode == SourceMode::Element && element_factory.is_none() {
            return Err(TrackError::config("element mode needs an element factory"));
        }
        validate_volume(volume)?;
        validate_pan(pan)?;

        let runtime = Handle::try_current()
            .map_err(|_| TrackError::config("tracks must be created inside a tokio runtime"))?;
        let adapter = HostAudioAdapter::new(context)?;
        adapter.require_source_mode(mode)?;

        let fetcher: Arc<dyn MediaFetcher> = match fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(DefaultFetcher::new()),
        };
        let (phase, _) = watch::channel(LoadPhase::Idle);
        let inner = Arc::new(Inner {
            id: NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed),
            mode,
            source,
            adapter,
            fetcher,
            elements: element_factory,
            autoplay,
            runtime,
            events: EventBus::new(),
            mix: Mutex::new(Mix { volume, pan }),
            state: Mutex::new(TrackState::Idle),
            phase,
        });
        tracing::debug!(
            track = inner.id,
            mode = %inner.mode,
            src = %inner.source,
            dialect = ?inner.adapter.dialect(),
            autoplay,
            "track created"
        );

        for (event, handler) in handlers {
            inner.events.on(event, move || handler());
        }
        if autoplay {
            inner.load();
        }
        Ok(Self { inner })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn source_mode(&self) -> SourceMode {
        self.inner.mode
    }

    pub fn source(&self) -> &TrackSource {
        &self.inner.source
    }

    pub fn on<F>(&self, event: TrackEvent, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.on(event, handler)
    }

    pub fn off(&self, event: TrackEvent, id: SubscriptionId) -> bool {
        self.inner.events.off(event, id)
    }

    /// Start loading without requesting playback. Does nothing once a load began.
    pub fn load(&self) {
        self.inner.load();
    }

    /// Play now if loaded, otherwise queue the request and make sure loading runs.
    pub fn play(&self) {
        self.inner.play();
    }

    pub fn pause(&self) {
        self.inner.halt(Halt::Pause);
    }

    pub fn stop(&self) {
        self.inner.halt(Halt::Stop);
    }

    /// Wait until the load settles, starting it if needed.
    pub async fn ready(&self) -> Result<(), TrackError> {
        self.inner.load();
        let mut phases = self.inner.phase.subscribe();
        let settled = phases
            .wait_for(|phase| phase.is_settled())
            .await
            .map(|phase| *phase);
        match settled {
            Ok(LoadPhase::Loaded) => Ok(()),
            _ => Err(TrackError::LoadFailed(self.inner.failure_reason())),
        }
    }

    pub fn status(&self) -> TrackStatus {
        let now = self.inner.adapter.current_time();
        self.inner.lock_state().snapshot(now)
    }

    /// Playback position in seconds; `None` until loaded.
    pub fn position(&self) -> Option<f64> {
        let now = self.inner.adapter.current_time();
        match &*self.inner.lock_state() {
            TrackState::Loaded(loaded) => Some(loaded.position(now)),
            _ => None,
        }
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), TrackError> {
        validate_volume(volume)?;
        self.inner.update_mix(|mix| mix.volume = volume);
        Ok(())
    }

    pub fn set_pan(&self, pan: f32) -> Result<(), TrackError> {
        validate_pan(pan)?;
        self.inner.update_mix(|mix| mix.pan = pan);
        Ok(())
    }

    /// Route the terminal pan node into `target` as well as the destination.
    pub fn connect(&self, target: &dyn GraphNode) -> HostResult<()> {
        match &*self.inner.lock_state() {
            TrackState::Loaded(loaded) => loaded.graph().connect(target),
            _ => Err(HostError::Node(format!(
                "track {} has no node graph yet",
                self.inner.id
            ))),
        }
    }
}

struct Inner {
    id: u64,
    mode: SourceMode,
    source: TrackSource,
    adapter: HostAudioAdapter,
    fetcher: Arc<dyn MediaFetcher>,
    elements: Option<Arc<dyn MediaElementFactory>>,
    autoplay: bool,
    runtime: Handle,
    events: EventBus,
    mix: Mutex<Mix>,
    state: Mutex<TrackState>,
    phase: watch::Sender<LoadPhase>,
}

type Settle = Arc<Mutex<Option<oneshot::Sender<ElementEvent>>>>;

/// Element listener that reports the first of its events through `tx`.
fn settle_on(tx: &Settle, event: ElementEvent) -> ElementListener {
    let tx = tx.clone();
    Arc::new(move || {
        let sender = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    })
}

/// A source primitive ready to be wired, plus what the load learned about it.
struct Prepared {
    source: SourceNode,
    duration: Option<f64>,
}

type LoadResult<T> = anyhow::Result<T>;

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, TrackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mix(&self) -> MutexGuard<'_, Mix> {
        self.mix.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(self: &Arc<Self>) {
        let mut state = self.lock_state();
        if !matches!(*state, TrackState::Idle) {
            return;
        }
        *state = TrackState::Loading(PendingRequests::default());
        drop(state);
        self.spawn_load();
    }

    fn play(self: &Arc<Self>) {
        let mut state = self.lock_state();
        if matches!(*state, TrackState::Idle) {
            *state = TrackState::Loading(PendingRequests {
                plays: 1,
                halt: None,
            });
            drop(state);
            self.spawn_load();
            return;
        }

        let result = match &mut *state {
            TrackState::Loaded(loaded) => {
                if let Some(held) = loaded.held_mut() {
                    held.queue_play();
                    return;
                }
                loaded.start(self.adapter.current_time())
            }
            TrackState::Loading(pending) => {
                pending.queue_play();
                tracing::debug!(track = self.id, pending = pending.plays, "play queued until loaded");
                return;
            }
            TrackState::Failed { reason } => {
                tracing::warn!(track = self.id, reason = %reason, "play ignored: load failed");
                return;
            }
            TrackState::Idle => return,
        };
        drop(state);
        self.report(result, TrackEvent::Play);
    }

    fn halt(&self, halt: Halt) {
        let mut state = self.lock_state();
        let now = self.adapter.current_time();
        let result = match &mut *state {
            TrackState::Loaded(loaded) => {
                if let Some(held) = loaded.held_mut() {
                    held.queue_halt(halt, self.autoplay);
                    return;
                }
                match halt {
                    Halt::Pause => loaded.pause(now),
                    Halt::Stop => loaded.stop(now),
                }
            }
            TrackState::Loading(pending) => {
                pending.queue_halt(halt, self.autoplay);
                return;
            }
            TrackState::Idle | TrackState::Failed { .. } => return,
        };
        drop(state);
        self.report(result, halt.event());
    }

    /// Emit `event` for a transition that happened, or `error` for a host failure.
    fn report(&self, result: HostResult<bool>, event: TrackEvent) {
        match result {
            Ok(true) => self.events.emit(event),
            Ok(false) => {
                tracing::trace!(track = self.id, event = %event, "no-op in current playback state")
            }
            Err(e) => {
                tracing::warn!(track = self.id, event = %event, "host rejected transition: {e}");
                self.events.emit(TrackEvent::Error);
            }
        }
    }

    fn update_mix(&self, apply: impl FnOnce(&mut Mix)) {
        // Lock order is state, then mix; see `finish`.
        let state = self.lock_state();
        let mix = {
            let mut mix = self.lock_mix();
            apply(&mut mix);
            *mix
        };
        let result = match &*state {
            TrackState::Loaded(loaded) => loaded.graph().apply_mix(mix),
            _ => Ok(()),
        };
        drop(state);
        if let Err(e) = result {
            tracing::warn!(track = self.id, "mix update failed: {e}");
            self.events.emit(TrackEvent::Error);
        }
    }

    fn failure_reason(&self) -> String {
        match &*self.lock_state() {
            TrackState::Failed { reason } => reason.clone(),
            _ => "load did not complete".to_string(),
        }
    }

    fn spawn_load(self: &Arc<Self>) {
        self.phase.send_replace(LoadPhase::Loading);
        tracing::info!(track = self.id, mode = %self.mode, src = %self.source, "load started");
        let inner = self.clone();
        self.runtime.spawn(async move { inner.run_load().await });
    }

    async fn run_load(self: Arc<Self>) {
        let prepared = match self.mode {
            SourceMode::Buffer => self.load_buffer().await,
            SourceMode::Element => self.load_element().await,
            SourceMode::Stream => self.load_stream(),
        };
        match prepared.and_then(|prepared| self.assemble(prepared)) {
            Ok((loaded, mix)) => self.finish(loaded, mix),
            Err(err) => self.fail(err),
        }
    }

    async fn load_buffer(&self) -> LoadResult<Prepared> {
        let TrackSource::Url(src) = &self.source else {
            bail!("buffer mode needs a url");
        };
        let bytes = self
            .fetcher
            .fetch_media_bytes(src)
            .await
            .with_context(|| format!("fetch {src}"))?;
        tracing::debug!(track = self.id, bytes = bytes.len(), "media fetched");
        self.events.emit(TrackEvent::LoadStart);

        let buffer = self.adapter.decode(bytes).await.context("decode media")?;
        let duration = buffer.duration().as_secs_f64();
        self.events.emit(TrackEvent::LoadedMetadata);
        self.events.emit(TrackEvent::CanPlay);

        let source = self
            .adapter
            .create_source(SourceInput::Buffer(buffer))
            .context("create buffer source")?;
        Ok(Prepared {
            source,
            duration: Some(duration),
        })
    }

    async fn load_element(&self) -> LoadResult<Prepared> {
        let (TrackSource::Url(src), Some(factory)) = (&self.source, &self.elements) else {
            bail!("element mode needs a url and an element factory");
        };
        let element = factory.create_media_element();

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let ready_id = element.add_event_listener(
            ElementEvent::CanPlayThrough,
            settle_on(&tx, ElementEvent::CanPlayThrough),
        );
        let error_id =
            element.add_event_listener(ElementEvent::Error, settle_on(&tx, ElementEvent::Error));

        element.set_src(src);
        self.events.emit(TrackEvent::LoadStart);

        let outcome = rx.await;
        element.remove_event_listener(ElementEvent::CanPlayThrough, ready_id);
        element.remove_event_listener(ElementEvent::Error, error_id);
        match outcome {
            Ok(ElementEvent::CanPlayThrough) => {}
            Ok(ElementEvent::Error) => bail!("element failed to load {src}"),
            Err(_) => bail!("element released its listeners before settling"),
        }
        self.events.emit(TrackEvent::LoadedMetadata);
        self.events.emit(TrackEvent::CanPlay);

        let source = self
            .adapter
            .create_source(SourceInput::Element(element))
            .context("attach media element")?;
        Ok(Prepared {
            source,
            duration: None,
        })
    }

    fn load_stream(&self) -> LoadResult<Prepared> {
        let TrackSource::Stream(stream) = &self.source else {
            bail!("stream mode needs a stream handle");
        };
        self.events.emit(TrackEvent::LoadStart);
        self.events.emit(TrackEvent::LoadedMetadata);
        self.events.emit(TrackEvent::CanPlay);

        let source = self
            .adapter
            .create_source(SourceInput::Stream(stream.clone()))
            .context("attach media stream")?;
        Ok(Prepared {
            source,
            duration: None,
        })
    }

    /// Build the graph and route it to the destination.
    fn assemble(&self, prepared: Prepared) -> LoadResult<(LoadedTrack, Mix)> {
        let mix = *self.lock_mix();
        let graph =
            NodeGraphBuilder::build(&self.adapter, prepared.source, mix).context("build graph")?;
        graph
            .connect(&self.adapter.destination())
            .context("connect to destination")?;
        Ok((LoadedTrack::new(graph, prepared.duration), mix))
    }

    /// Publish the loaded graph, announce `canplaythrough`, then replay queued requests.
    ///
    /// Plays and halts that arrive before the announcement stay held, so `play` never
    /// precedes `canplaythrough`.
    fn finish(self: &Arc<Self>, mut loaded: LoadedTrack, built_with: Mix) {
        {
            let mut state = self.lock_state();
            // Only the load task leaves `Loading`.
            let pending = match &*state {
                TrackState::Loading(pending) => *pending,
                _ => PendingRequests::default(),
            };
            let mix = *self.lock_mix();
            if mix != built_with {
                if let Err(e) = loaded.graph().apply_mix(mix) {
                    tracing::warn!(track = self.id, "mix update failed: {e}");
                }
            }
            loaded.hold(pending);
            *state = TrackState::Loaded(loaded);
        }
        tracing::info!(track = self.id, "track loaded");
        self.events.emit(TrackEvent::CanPlayThrough);

        let pending = match &mut *self.lock_state() {
            TrackState::Loaded(loaded) => loaded.release().unwrap_or_default(),
            _ => PendingRequests::default(),
        };
        tracing::debug!(track = self.id, queued_plays = pending.plays, "replaying queued requests");
        if pending.plays > 0 || self.autoplay {
            self.play();
        }
        if let Some(halt) = pending.halt {
            self.halt(halt);
        }
        self.phase.send_replace(LoadPhase::Loaded);
    }

    fn fail(&self, err: anyhow::Error) {
        let reason = format!("{err:#}");
        tracing::warn!(track = self.id, src = %self.source, "load failed: {reason}");
        *self.lock_state() = TrackState::Failed { reason };
        self.events.emit(TrackEvent::Error);
        self.phase.send_replace(LoadPhase::Failed);
    }
}
