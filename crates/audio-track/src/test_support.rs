//! Test doubles: a counting mock host, controllable fetchers and elements.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::buffer::AudioBuffer;
use crate::element::{
    ElementEvent, ElementListener, ListenerId, MediaElement, MediaElementFactory,
};
use crate::error::{HostError, HostResult};
use crate::fetch::MediaFetcher;
use crate::host::{
    AudioContext, AudioNode, AudioParam, AudioSourceNode, DecodeCallback, MediaStream, NodeId,
    Primitive,
};

#[derive(Default)]
struct Log {
    calls: HashMap<Primitive, usize>,
    edges: Vec<(NodeId, NodeId)>,
    params: HashMap<(NodeId, AudioParam), f32>,
    history: Vec<(AudioParam, f32)>,
    starts: Vec<(NodeId, f64)>,
    stops: usize,
    buffers: usize,
}

struct Recorder {
    next_id: AtomicU64,
    log: Mutex<Log>,
}

impl Recorder {
    fn node(self: &Arc<Self>) -> MockNode {
        MockNode {
            id: NodeId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            recorder: self.clone(),
        }
    }

    fn call(&self, primitive: Primitive) {
        *self.log.lock().unwrap().calls.entry(primitive).or_default() += 1;
    }
}

pub(crate) struct MockNode {
    id: NodeId,
    recorder: Arc<Recorder>,
}

impl AudioNode for MockNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn connect(&self, target: &dyn AudioNode) -> HostResult<()> {
        self.recorder.log.lock().unwrap().edges.push((self.id, target.id()));
        Ok(())
    }

    fn set_param(&self, param: AudioParam, value: f32) -> HostResult<()> {
        let mut log = self.recorder.log.lock().unwrap();
        log.params.insert((self.id, param), value);
        log.history.push((param, value));
        Ok(())
    }
}

pub(crate) struct MockSource {
    node: MockNode,
    element: Option<Arc<dyn MediaElement>>,
}

impl AudioNode for MockSource {
    fn id(&self) -> NodeId {
        self.node.id
    }

    fn connect(&self, target: &dyn AudioNode) -> HostResult<()> {
        self.node.connect(target)
    }
}

impl AudioSourceNode for MockSource {
    fn as_node(&self) -> &dyn AudioNode {
        self
    }

    fn start(&self, _when: f64, offset: f64) -> HostResult<()> {
        if let Some(element) = &self.element {
            element.play();
        }
        self.node.recorder.log.lock().unwrap().starts.push((self.node.id, offset));
        Ok(())
    }

    fn stop(&self, _when: f64) -> HostResult<()> {
        self.node.recorder.log.lock().unwrap().stops += 1;
        Ok(())
    }

    fn set_buffer(&self, _buffer: AudioBuffer) -> HostResult<()> {
        self.node.recorder.log.lock().unwrap().buffers += 1;
        Ok(())
    }
}

/// Host double that implements exactly the primitives it is told to.
///
/// Decoding yields a mono 8 kHz buffer with one frame per two input bytes.
/// The clock is manual; see [`MockContext::advance`].
pub(crate) struct MockContext {
    primitives: HashSet<Primitive>,
    recorder: Arc<Recorder>,
    destination: Arc<MockNode>,
    now: Mutex<f64>,
    drop_callbacks: AtomicBool,
    fail_decode: AtomicBool,
}

impl MockContext {
    pub(crate) fn with_primitives(primitives: &[Primitive]) -> Arc<Self> {
        let recorder = Arc::new(Recorder {
            next_id: AtomicU64::new(100),
            log: Mutex::new(Log::default()),
        });
        let destination = Arc::new(recorder.node());
        Arc::new(Self {
            primitives: primitives.iter().copied().collect(),
            recorder,
            destination,
            now: Mutex::new(0.0),
            drop_callbacks: AtomicBool::new(false),
            fail_decode: AtomicBool::new(false),
        })
    }

    pub(crate) fn unprefixed() -> Arc<Self> {
        Self::with_primitives(&[
            Primitive::CreateGain,
            Primitive::DecodeAudioData,
            Primitive::CreatePanner,
            Primitive::CreateBufferSource,
            Primitive::CreateMediaElementSource,
            Primitive::CreateMediaStreamSource,
        ])
    }

    pub(crate) fn prefixed() -> Arc<Self> {
        Self::with_primitives(&[
            Primitive::CreateGainNode,
            Primitive::CreateBuffer,
            Primitive::CreatePanner,
            Primitive::CreateBufferSource,
        ])
    }

    pub(crate) fn bare() -> Arc<Self> {
        Self::with_primitives(&[Primitive::CreatePanner])
    }

    pub(crate) fn calls(&self, primitive: Primitive) -> usize {
        self.recorder
            .log
            .lock()
            .unwrap()
            .calls
            .get(&primitive)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.recorder.log.lock().unwrap().edges.clone()
    }

    pub(crate) fn param(&self, node: NodeId, param: AudioParam) -> Option<f32> {
        self.recorder.log.lock().unwrap().params.get(&(node, param)).copied()
    }

    /// Most recent value written to `param` on any node.
    pub(crate) fn last_param(&self, param: AudioParam) -> Option<f32> {
        self.recorder
            .log
            .lock()
            .unwrap()
            .history
            .iter()
            .rev()
            .find(|(p, _)| *p == param)
            .map(|(_, v)| *v)
    }

    /// Offsets passed to every source `start`, in order.
    pub(crate) fn start_offsets(&self) -> Vec<f64> {
        self.recorder
            .log
            .lock()
            .unwrap()
            .starts
            .iter()
            .map(|(_, offset)| *offset)
            .collect()
    }

    pub(crate) fn stops(&self) -> usize {
        self.recorder.log.lock().unwrap().stops
    }

    pub(crate) fn buffers_attached(&self) -> usize {
        self.recorder.log.lock().unwrap().buffers
    }

    pub(crate) fn destination_id(&self) -> NodeId {
        self.destination.id
    }

    pub(crate) fn advance(&self, seconds: f64) {
        *self.now.lock().unwrap() += seconds;
    }

    pub(crate) fn drop_decode_callbacks(&self) {
        self.drop_callbacks.store(true, Ordering::Relaxed);
    }

    pub(crate) fn fail_decode(&self) {
        self.fail_decode.store(true, Ordering::Relaxed);
    }

    fn gate(&self, primitive: Primitive) -> HostResult<()> {
        if !self.primitives.contains(&primitive) {
            return Err(HostError::Missing(primitive));
        }
        self.recorder.call(primitive);
        Ok(())
    }

    fn decoded(&self, data: &[u8]) -> HostResult<AudioBuffer> {
        if self.fail_decode.load(Ordering::Relaxed) {
            return Err(HostError::Decode("corrupt media".to_string()));
        }
        Ok(AudioBuffer::new(8_000, 1, vec![0.0; data.len() / 2]))
    }

    fn source(&self, element: Option<Arc<dyn MediaElement>>) -> Arc<dyn AudioSourceNode> {
        Arc::new(MockSource {
            node: self.recorder.node(),
            element,
        })
    }
}

impl AudioContext for MockContext {
    fn supports(&self, primitive: Primitive) -> bool {
        self.primitives.contains(&primitive)
    }

    fn create_gain(&self) -> HostResult<Arc<dyn AudioNode>> {
        self.gate(Primitive::CreateGain)?;
        Ok(Arc::new(self.recorder.node()))
    }

    fn create_gain_node(&self) -> HostResult<Arc<dyn AudioNode>> {
        self.gate(Primitive::CreateGainNode)?;
        Ok(Arc::new(self.recorder.node()))
    }

    fn create_panner(&self) -> HostResult<Arc<dyn AudioNode>> {
        self.gate(Primitive::CreatePanner)?;
        Ok(Arc::new(self.recorder.node()))
    }

    fn create_buffer_source(&self) -> HostResult<Arc<dyn AudioSourceNode>> {
        self.gate(Primitive::CreateBufferSource)?;
        Ok(self.source(None))
    }

    fn create_media_element_source(
        &self,
        element: Arc<dyn MediaElement>,
    ) -> HostResult<Arc<dyn AudioSourceNode>> {
        self.gate(Primitive::CreateMediaElementSource)?;
        Ok(self.source(Some(element)))
    }

    fn create_media_stream_source(
        &self,
        _stream: &MediaStream,
    ) -> HostResult<Arc<dyn AudioSourceNode>> {
        self.gate(Primitive::CreateMediaStreamSource)?;
        Ok(self.source(None))
    }

    fn decode_audio_data(&self, data: Vec<u8>, callback: DecodeCallback) {
        if let Err(e) = self.gate(Primitive::DecodeAudioData) {
            callback(Err(e));
            return;
        }
        if self.drop_callbacks.load(Ordering::Relaxed) {
            drop(callback);
            return;
        }
        callback(self.decoded(&data));
    }

    fn create_buffer(&self, data: &[u8]) -> HostResult<AudioBuffer> {
        self.gate(Primitive::CreateBuffer)?;
        self.decoded(data)
    }

    fn destination(&self) -> Arc<dyn AudioNode> {
        self.destination.clone()
    }

    fn current_time(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}

/// Fetcher that answers once the test releases it.
pub(crate) struct GatedFetcher {
    pending: Mutex<Option<oneshot::Receiver<Result<Vec<u8>>>>>,
    calls: AtomicUsize,
}

impl GatedFetcher {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Sender<Result<Vec<u8>>>) {
        let (tx, rx) = oneshot::channel();
        let fetcher = Arc::new(Self {
            pending: Mutex::new(Some(rx)),
            calls: AtomicUsize::new(0),
        });
        (fetcher, tx)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for GatedFetcher {
    async fn fetch_media_bytes(&self, _src: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rx = self.pending.lock().unwrap().take();
        match rx {
            Some(rx) => rx.await.map_err(|_| anyhow!("fetch gate dropped"))?,
            None => Err(anyhow!("fetch issued twice")),
        }
    }
}

/// Fetcher that answers immediately with fixed bytes or a failure.
pub(crate) struct StaticFetcher {
    bytes: Option<Vec<u8>>,
}

impl StaticFetcher {
    pub(crate) fn ok(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self { bytes: Some(bytes) })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self { bytes: None })
    }
}

#[async_trait]
impl MediaFetcher for StaticFetcher {
    async fn fetch_media_bytes(&self, src: &str) -> Result<Vec<u8>> {
        self.bytes
            .clone()
            .ok_or_else(|| anyhow!("404 for {src}"))
    }
}

/// Element whose notifications are fired by the test.
#[derive(Default)]
pub(crate) struct ScriptedElement {
    src: Mutex<Option<String>>,
    listeners: Mutex<Vec<(ListenerId, ElementEvent, ElementListener)>>,
    next_listener: AtomicU64,
    playing: AtomicBool,
}

impl ScriptedElement {
    pub(crate) fn src(&self) -> Option<String> {
        self.src.lock().unwrap().clone()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub(crate) fn fire(&self, event: ElementEvent) {
        let matching: Vec<ElementListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, l)| l.clone())
            .collect();
        for listener in matching {
            listener();
        }
    }
}

impl MediaElement for ScriptedElement {
    fn set_src(&self, src: &str) {
        *self.src.lock().unwrap() = Some(src.to_string());
    }

    fn add_event_listener(&self, event: ElementEvent, listener: ElementListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().unwrap().push((id, event, listener));
        id
    }

    fn remove_event_listener(&self, event: ElementEvent, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(l, e, _)| !(*l == id && *e == event));
    }

    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

/// Factory handing out one shared [`ScriptedElement`].
pub(crate) struct ScriptedElementFactory {
    pub(crate) element: Arc<ScriptedElement>,
    pub(crate) created: AtomicUsize,
}

impl ScriptedElementFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            element: Arc::new(ScriptedElement::default()),
            created: AtomicUsize::new(0),
        })
    }
}

impl MediaElementFactory for ScriptedElementFactory {
    fn create_media_element(&self) -> Arc<dyn MediaElement> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.element.clone()
    }
}

/// A 16-bit mono PCM WAV file with `frames` frames of silence.
pub(crate) fn wav_bytes(sample_rate: u32, frames: u32) -> Vec<u8> {
    let data_len = frames * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(44 + data_len as usize, 0);
    out
}
