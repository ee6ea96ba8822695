use std::sync::Arc;

use tensorpipe_core::NodeId;
use tensorpipe_model::{EndModel, LayerModel};
use tensorpipe_topology::{PipeRegistry, Transport};

use crate::tracker::JobTracker;

/// Everything a job processor pass on this node needs: the node's own identity, what it
/// can compute locally, and how it reaches the tracker and the rest of the pipe. Passed
/// explicitly rather than reached through an ambient global, so the pending queue, the
/// tracker and the model registries all have one obvious owner.
pub struct JobContext {
    pub self_node_id: NodeId,
    pub prefill_chunk_size: u32,
    pub tracker: Arc<JobTracker>,
    pub pipes: Arc<PipeRegistry>,
    pub end_model: Option<Arc<dyn EndModel>>,
    pub layer_model: Option<Arc<dyn LayerModel>>,
    pub transport: Arc<dyn Transport>,
}

impl JobContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        self_node_id: NodeId,
        prefill_chunk_size: u32,
        tracker: Arc<JobTracker>,
        pipes: Arc<PipeRegistry>,
        end_model: Option<Arc<dyn EndModel>>,
        layer_model: Option<Arc<dyn LayerModel>>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            self_node_id,
            prefill_chunk_size,
            tracker,
            pipes,
            end_model,
            layer_model,
            transport,
        })
    }
}
