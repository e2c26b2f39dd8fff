//! Graph node variants built on host primitives.
//!
//! Every variant shares one capability, [`GraphNode::connect`], which forwards to the
//! wrapped host node. New node types only have to expose their host node.

use std::sync::Arc;

use audio_track_types::SourceMode;

use crate::error::HostResult;
use crate::host::{AudioNode, AudioParam, AudioSourceNode, NodeId};

pub trait GraphNode: Send + Sync {
    fn host_node(&self) -> &dyn AudioNode;

    fn id(&self) -> NodeId {
        self.host_node().id()
    }

    /// Route this node's output into `target`.
    fn connect(&self, target: &dyn GraphNode) -> HostResult<()> {
        self.host_node().connect(target.host_node())
    }
}

pub struct GainNode {
    node: Arc<dyn AudioNode>,
}

impl GainNode {
    pub fn new(node: Arc<dyn AudioNode>) -> Self {
        Self { node }
    }

    pub fn set_gain(&self, value: f32) -> HostResult<()> {
        self.node.set_param(AudioParam::Gain, value)
    }
}

impl GraphNode for GainNode {
    fn host_node(&self) -> &dyn AudioNode {
        self.node.as_ref()
    }
}

/// Left/right panner over the host's `createPanner` primitive.
pub struct PanNode2D {
    node: Arc<dyn AudioNode>,
}

impl PanNode2D {
    pub fn new(node: Arc<dyn AudioNode>) -> Self {
        Self { node }
    }

    /// Position in `[-1.0, 1.0]`; values outside are clamped.
    pub fn set_position(&self, x: f32) -> HostResult<()> {
        self.node.set_param(AudioParam::Pan, x.clamp(-1.0, 1.0))
    }
}

impl GraphNode for PanNode2D {
    fn host_node(&self) -> &dyn AudioNode {
        self.node.as_ref()
    }
}

/// The sound-producing head of a track's graph.
pub struct SourceNode {
    node: Arc<dyn AudioSourceNode>,
    mode: SourceMode,
}

impl SourceNode {
    pub fn new(node: Arc<dyn AudioSourceNode>, mode: SourceMode) -> Self {
        Self { node, mode }
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn start(&self, when: f64, offset: f64) -> HostResult<()> {
        self.node.start(when, offset)
    }

    pub fn stop(&self, when: f64) -> HostResult<()> {
        self.node.stop(when)
    }
}

impl GraphNode for SourceNode {
    fn host_node(&self) -> &dyn AudioNode {
        self.node.as_node()
    }
}

/// The host's final output.
pub struct Destination {
    node: Arc<dyn AudioNode>,
}

impl Destination {
    pub fn new(node: Arc<dyn AudioNode>) -> Self {
        Self { node }
    }
}

impl GraphNode for Destination {
    fn host_node(&self) -> &dyn AudioNode {
        self.node.as_ref()
    }
}
