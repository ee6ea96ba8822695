use async_trait::async_trait;
use tensorpipe_core::NodeId;
use tensorpipe_wire::LayerJob;

use crate::error::Result;

/// Delivers a `LayerJob` envelope to another node's job receiver. A 200-equivalent
/// response confirms receipt; anything else (including a connect failure) is surfaced as
/// `TopologyError::SendFailed`, which the job processor's `SEND` state treats as terminal
/// for this pass (the origin's staleness sweep is what recovers a stuck job, not a
/// caller-side retry).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_job(&self, envelope: &LayerJob, dest: NodeId) -> Result<()>;
}
