//! In-process host with no audio output.
//!
//! `HeadlessContext` implements either dialect on top of Symphonia decoding. It keeps a
//! record of node connections, parameter values and source start/stop calls, which makes
//! it useful for driving tracks from the CLI and for inspecting graphs. No samples are
//! rendered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tokio::runtime::Handle;

use crate::buffer::AudioBuffer;
use crate::decode;
use crate::element::{
    ElementEvent, ElementListener, ListenerId, MediaElement, MediaElementFactory,
};
use crate::error::{HostError, HostResult};
use crate::fetch::MediaFetcher;
use crate::host::{
    AudioContext, AudioNode, AudioParam, AudioSourceNode, DecodeCallback, Dialect, MediaStream,
    NodeId, Primitive,
};

#[derive(Default)]
struct GraphRecord {
    edges: Vec<(NodeId, NodeId)>,
    params: HashMap<(NodeId, AudioParam), f32>,
    kinds: HashMap<NodeId, &'static str>,
}

struct Shared {
    next_id: AtomicU64,
    record: Mutex<GraphRecord>,
}

impl Shared {
    fn record(&self) -> std::sync::MutexGuard<'_, GraphRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn node(self: &Arc<Self>, kind: &'static str) -> HeadlessNode {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.record().kinds.insert(id, kind);
        HeadlessNode {
            id,
            shared: self.clone(),
        }
    }
}

struct HeadlessNode {
    id: NodeId,
    shared: Arc<Shared>,
}

impl AudioNode for HeadlessNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn connect(&self, target: &dyn AudioNode) -> HostResult<()> {
        if target.id() == self.id {
            return Err(HostError::Node(format!("node {:?} cannot feed itself", self.id)));
        }
        self.shared.record().edges.push((self.id, target.id()));
        Ok(())
    }

    fn set_param(&self, param: AudioParam, value: f32) -> HostResult<()> {
        let kind = self.shared.record().kinds.get(&self.id).copied();
        let accepts = matches!(
            (kind, param),
            (Some("gain"), AudioParam::Gain) | (Some("panner"), AudioParam::Pan)
        );
        if !accepts {
            return Err(HostError::Node(format!(
                "node {:?} has no {param:?} parameter",
                self.id
            )));
        }
        self.shared.record().params.insert((self.id, param), value);
        Ok(())
    }
}

struct HeadlessSource {
    node: HeadlessNode,
    buffer: Mutex<Option<AudioBuffer>>,
    element: Option<Arc<dyn MediaElement>>,
    running: AtomicBool,
}

impl HeadlessSource {
    fn new(node: HeadlessNode, element: Option<Arc<dyn MediaElement>>) -> Self {
        Self {
            node,
            buffer: Mutex::new(None),
            element,
            running: AtomicBool::new(false),
        }
    }
}

impl AudioNode for HeadlessSource {
    fn id(&self) -> NodeId {
        self.node.id
    }

    fn connect(&self, target: &dyn AudioNode) -> HostResult<()> {
        self.node.connect(target)
    }
}

impl AudioSourceNode for HeadlessSource {
    fn as_node(&self) -> &dyn AudioNode {
        self
    }

    fn start(&self, when: f64, offset: f64) -> HostResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(HostError::Node(format!("source {:?} already started", self.node.id)));
        }
        if let Some(element) = &self.element {
            element.play();
        }
        tracing::debug!(node = self.node.id.0, when, offset, "headless source start");
        Ok(())
    }

    fn stop(&self, when: f64) -> HostResult<()> {
        self.running.store(false, Ordering::Release);
        if let Some(element) = &self.element {
            element.pause();
        }
        tracing::debug!(node = self.node.id.0, when, "headless source stop");
        Ok(())
    }

    fn set_buffer(&self, buffer: AudioBuffer) -> HostResult<()> {
        *self.buffer.lock().unwrap_or_else(PoisonError::into_inner) = Some(buffer);
        Ok(())
    }
}

/// Headless host context.
pub struct HeadlessContext {
    dialect: Dialect,
    shared: Arc<Shared>,
    destination: Arc<HeadlessNode>,
    clock: Instant,
    sources: Mutex<Vec<Arc<HeadlessSource>>>,
}

impl HeadlessContext {
    pub fn new(dialect: Dialect) -> Arc<Self> {
        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(0),
            record: Mutex::new(GraphRecord::default()),
        });
        let destination = Arc::new(shared.node("destination"));
        Arc::new(Self {
            dialect,
            shared,
            destination,
            clock: Instant::now(),
            sources: Mutex::new(Vec::new()),
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Every `connect` call so far, as `(from, to)`.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.shared.record().edges.clone()
    }

    pub fn param(&self, node: NodeId, param: AudioParam) -> Option<f32> {
        self.shared.record().params.get(&(node, param)).copied()
    }

    /// Number of sources currently started.
    pub fn running_sources(&self) -> usize {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.running.load(Ordering::Acquire))
            .count()
    }

    fn register_source(&self, source: HeadlessSource) -> Arc<dyn AudioSourceNode> {
        let source = Arc::new(source);
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source.clone());
        source
    }

    fn decode(data: &[u8]) -> HostResult<AudioBuffer> {
        decode::decode_bytes(data.to_vec()).map_err(|e| HostError::Decode(format!("{e:#}")))
    }
}

impl AudioContext for HeadlessContext {
    fn supports(&self, primitive: Primitive) -> bool {
        match primitive {
            Primitive::CreateGain | Primitive::DecodeAudioData => {
                self.dialect == Dialect::Unprefixed
            }
            Primitive::CreateGainNode | Primitive::CreateBuffer => {
                self.dialect == Dialect::Prefixed
            }
            Primitive::CreatePanner
            | Primitive::CreateBufferSource
            | Primitive::CreateMediaElementSource
            | Primitive::CreateMediaStreamSource => true,
        }
    }

    fn create_gain(&self) -> HostResult<Arc<dyn AudioNode>> {
        if self.dialect != Dialect::Unprefixed {
            return Err(HostError::Missing(Primitive::CreateGain));
        }
        Ok(Arc::new(self.shared.node("gain")))
    }

    fn create_gain_node(&self) -> HostResult<Arc<dyn AudioNode>> {
        if self.dialect != Dialect::Prefixed {
            return Err(HostError::Missing(Primitive::CreateGainNode));
        }
        Ok(Arc::new(self.shared.node("gain")))
    }

    fn create_panner(&self) -> HostResult<Arc<dyn AudioNode>> {
        Ok(Arc::new(self.shared.node("panner")))
    }

    fn create_buffer_source(&self) -> HostResult<Arc<dyn AudioSourceNode>> {
        Ok(self.register_source(HeadlessSource::new(self.shared.node("buffer-source"), None)))
    }

    fn create_media_element_source(
        &self,
        element: Arc<dyn MediaElement>,
    ) -> HostResult<Arc<dyn AudioSourceNode>> {
        Ok(self.register_source(HeadlessSource::new(
            self.shared.node("element-source"),
            Some(element),
        )))
    }

    fn create_media_stream_source(
        &self,
        stream: &MediaStream,
    ) -> HostResult<Arc<dyn AudioSourceNode>> {
        tracing::debug!(stream = stream.label(), "headless stream source");
        Ok(self.register_source(HeadlessSource::new(self.shared.node("stream-source"), None)))
    }

    fn decode_audio_data(&self, data: Vec<u8>, callback: DecodeCallback) {
        if self.dialect != Dialect::Unprefixed {
            callback(Err(HostError::Missing(Primitive::DecodeAudioData)));
            return;
        }
        thread::spawn(move || callback(Self::decode(&data)));
    }

    fn create_buffer(&self, data: &[u8]) -> HostResult<AudioBuffer> {
        if self.dialect != Dialect::Prefixed {
            return Err(HostError::Missing(Primitive::CreateBuffer));
        }
        Self::decode(data)
    }

    fn destination(&self) -> Arc<dyn AudioNode> {
        self.destination.clone()
    }

    fn current_time(&self) -> f64 {
        self.clock.elapsed().as_secs_f64()
    }
}

/// Element that checks its source through a fetcher and reports readiness.
pub struct HeadlessElement {
    runtime: Handle,
    fetcher: Arc<dyn MediaFetcher>,
    listeners: Arc<Mutex<Vec<(ListenerId, ElementEvent, ElementListener)>>>,
    next_listener: AtomicU64,
    playing: AtomicBool,
}

impl HeadlessElement {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn dispatch(
        listeners: &Mutex<Vec<(ListenerId, ElementEvent, ElementListener)>>,
        event: ElementEvent,
    ) {
        let matching: Vec<ElementListener> = listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, l)| l.clone())
            .collect();
        for listener in matching {
            listener();
        }
    }
}

impl MediaElement for HeadlessElement {
    fn set_src(&self, src: &str) {
        let src = src.to_string();
        let fetcher = self.fetcher.clone();
        let listeners = self.listeners.clone();
        self.runtime.spawn(async move {
            let event = match fetcher.fetch_media_bytes(&src).await {
                Ok(_) => ElementEvent::CanPlayThrough,
                Err(e) => {
                    tracing::warn!(src = %src, "element source failed: {e:#}");
                    ElementEvent::Error
                }
            };
            Self::dispatch(&listeners, event);
        });
    }

    fn add_event_listener(&self, event: ElementEvent, listener: ElementListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, event, listener));
        id
    }

    fn remove_event_listener(&self, event: ElementEvent, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(l, e, _)| !(*l == id && *e == event));
    }

    fn play(&self) {
        self.playing.store(true, Ordering::Release);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::Release);
    }
}

/// Factory for [`HeadlessElement`]s sharing one fetcher and runtime.
pub struct HeadlessElementFactory {
    runtime: Handle,
    fetcher: Arc<dyn MediaFetcher>,
}

impl HeadlessElementFactory {
    pub fn new(runtime: Handle, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self { runtime, fetcher }
    }
}

impl MediaElementFactory for HeadlessElementFactory {
    fn create_media_element(&self) -> Arc<dyn MediaElement> {
        Arc::new(HeadlessElement {
            runtime: self.runtime.clone(),
            fetcher: self.fetcher.clone(),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            playing: AtomicBool::new(false),
        })
    }
}
