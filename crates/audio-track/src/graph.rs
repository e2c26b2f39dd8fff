//! Node-graph assembly: source → gain → pan.

use crate::error::HostResult;
use crate::host::{AudioNode, HostAudioAdapter};
use crate::nodes::{GainNode, GraphNode, PanNode2D, SourceNode};

/// Initial gain and pan applied when a graph is built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mix {
    pub volume: f32,
    pub pan: f32,
}

impl Default for Mix {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
        }
    }
}

/// A wired processing chain owned by one track.
///
/// The graph itself is a [`GraphNode`]: connecting it connects the terminal pan node.
pub struct NodeGraph {
    source: SourceNode,
    gain: GainNode,
    pan: PanNode2D,
}

impl NodeGraph {
    pub fn source(&self) -> &SourceNode {
        &self.source
    }

    pub fn gain(&self) -> &GainNode {
        &self.gain
    }

    /// Terminal node, to be connected onward by the caller.
    pub fn terminal(&self) -> &PanNode2D {
        &self.pan
    }

    pub fn apply_mix(&self, mix: Mix) -> HostResult<()> {
        self.gain.set_gain(mix.volume)?;
        self.pan.set_position(mix.pan)
    }
}

impl GraphNode for NodeGraph {
    fn host_node(&self) -> &dyn AudioNode {
        self.pan.host_node()
    }
}

/// Stateless assembly of a track's processing chain.
pub struct NodeGraphBuilder;

impl NodeGraphBuilder {
    /// Create gain and pan nodes, wire `source → gain → pan` and apply `mix`.
    ///
    /// Each call allocates new host nodes.
    pub fn build(adapter: &HostAudioAdapter, source: SourceNode, mix: Mix) -> HostResult<NodeGraph> {
        let gain = adapter.create_gain_node()?;
        let pan = adapter.create_pan_node()?;

        source.connect(&gain)?;
        gain.connect(&pan)?;

        let graph = NodeGraph { source, gain, pan };
        graph.apply_mix(mix)?;
        Ok(graph)
    }
}
