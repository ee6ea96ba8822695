use std::sync::Arc;

use tensorpipe_core::{JobId, ModelId};
use tensorpipe_wire::{ChatMessage, SamplingParams};
use tracing::info;

use crate::context::JobContext;
use crate::error::{JobError, JobOutcome, Result};
use crate::job::Job;
use crate::tracker::{ResolveCallback, UpdateCallback};

/// Constructs a new job, registers it with the tracker, and bootstraps the FSM by
/// sending its first envelope to the origin node itself (this node). `on_start` fires
/// synchronously before the first envelope goes out so the caller can, for instance,
/// capture the assigned `job_id` before any update arrives.
pub struct JobFactory;

impl JobFactory {
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        ctx: &Arc<JobContext>,
        model_id: ModelId,
        messages: Vec<ChatMessage>,
        max_completion_tokens: u32,
        sampling: SamplingParams,
        on_start: impl FnOnce(&Job),
        on_update: UpdateCallback,
        resolve: ResolveCallback,
    ) -> Result<JobId> {
        if ctx.end_model.is_none() {
            return Err(JobError::NoEndModel(model_id));
        }
        let pipe = ctx
            .pipes
            .find_for_model(&model_id)
            .map_err(|e| match e {
                tensorpipe_topology::TopologyError::NoPipe(m) => JobError::NoPipe(m),
                tensorpipe_topology::TopologyError::PipeIncomplete(_) => {
                    JobError::PipeIncomplete(model_id.clone())
                }
                other => JobError::Topology(other),
            })?;

        let job_id = JobId::generate();
        let job = Job::new(
            job_id,
            ctx.self_node_id,
            pipe.id.clone(),
            model_id.clone(),
            messages,
            max_completion_tokens,
            sampling,
        );

        on_start(&job);
        ctx.tracker.add(job.clone_for_bootstrap(), on_update, resolve);

        info!(job_id = %job_id, model_id = %model_id, "job started");

        let envelope = job.to_layer_job();
        if let Err(e) = ctx.transport.send_job(&envelope, ctx.self_node_id).await {
            ctx.tracker
                .complete(job_id, JobOutcome::SendFailed);
            return Err(JobError::SendFailed(e.to_string()));
        }

        Ok(job_id)
    }
}

impl Job {
    /// Separate from `Clone` so call sites make the "I am handing this exact state to
    /// the tracker" step explicit at the hand-off boundary.
    fn clone_for_bootstrap(&self) -> Job {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tensorpipe_core::NodeId;
    use tensorpipe_model::{ReferenceEndModel, ReferenceLayerModel};
    use tensorpipe_topology::{InMemoryNetworkDirectory, Pipe, PipeRegistry, Segment, Transport};

    struct LoopbackTransport;

    #[async_trait::async_trait]
    impl Transport for LoopbackTransport {
        async fn send_job(
            &self,
            _envelope: &tensorpipe_wire::LayerJob,
            _dest: NodeId,
        ) -> tensorpipe_topology::Result<()> {
            Ok(())
        }
    }

    fn context() -> Arc<JobContext> {
        let self_node = NodeId::generate();
        let pipes = Arc::new(PipeRegistry::new());
        pipes.insert(Pipe::new(
            tensorpipe_core::PipeId::new("p1"),
            ModelId::new("m"),
            0,
            self_node,
            vec![],
        ));
        JobContext::new(
            self_node,
            6,
            crate::tracker::JobTracker::new(
                Duration::from_secs(10),
                Duration::from_secs(60),
                Some(Arc::new(ReferenceLayerModel::new())),
            ),
            pipes,
            Some(Arc::new(ReferenceEndModel::new(8))),
            Some(Arc::new(ReferenceLayerModel::new())),
            Arc::new(LoopbackTransport),
        )
    }

    #[tokio::test]
    async fn start_fails_without_a_complete_pipe_for_other_models() {
        let ctx = context();
        let result = JobFactory::start(
            &ctx,
            ModelId::new("does-not-exist"),
            vec![],
            8,
            SamplingParams::default(),
            |_| {},
            Arc::new(|_| {}),
            Arc::new(|_| {}),
        )
        .await;
        assert!(matches!(result, Err(JobError::NoPipe(_))));
    }

    #[tokio::test]
    async fn start_registers_job_and_sends_bootstrap_envelope() {
        let ctx = context();
        let started = Arc::new(AtomicBool::new(false));
        let started_clone = started.clone();
        let job_id = JobFactory::start(
            &ctx,
            ModelId::new("m"),
            vec![],
            8,
            SamplingParams::default(),
            move |_| started_clone.store(true, Ordering::SeqCst),
            Arc::new(|_| {}),
            Arc::new(|_| {}),
        )
        .await
        .unwrap();

        assert!(started.load(Ordering::SeqCst));
        assert!(ctx.tracker.get(job_id).is_some());
    }
}
