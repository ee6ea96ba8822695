use serde::{Deserialize, Serialize};
use tensorpipe_core::NodeId;

/// One contiguous range of decoder layers within a pipe. `Local` carries whether the
/// weights are actually resident; `Virtual` segments are owned by some other node and are
/// taken on faith once discovered (this node has no way to observe their load state
/// directly), replacing the original boolean `virtual` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Local {
        node_id: NodeId,
        start_layer: u32,
        end_layer: u32,
        loaded: bool,
    },
    Virtual {
        node_id: NodeId,
        start_layer: u32,
        end_layer: u32,
    },
}

impl Segment {
    pub fn node_id(&self) -> NodeId {
        match self {
            Segment::Local { node_id, .. } | Segment::Virtual { node_id, .. } => *node_id,
        }
    }

    pub fn start_layer(&self) -> u32 {
        match self {
            Segment::Local { start_layer, .. } | Segment::Virtual { start_layer, .. } => {
                *start_layer
            }
        }
    }

    pub fn end_layer(&self) -> u32 {
        match self {
            Segment::Local { end_layer, .. } | Segment::Virtual { end_layer, .. } => *end_layer,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Segment::Virtual { .. })
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            Segment::Local { loaded, .. } => *loaded,
            Segment::Virtual { .. } => true,
        }
    }

    pub fn covers(&self, layer: u32) -> bool {
        layer >= self.start_layer() && layer <= self.end_layer()
    }
}
