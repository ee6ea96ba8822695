use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use dashmap::DashSet;
use parking_lot::Mutex;
use tensorpipe_core::JobId;
use tensorpipe_wire::{ComputeStep, JobData, LayerJob};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::context::JobContext;
use crate::processor::JobProcessor;

/// Bounded intake for inbound envelopes, served LIFO: the hop that just arrived is the
/// one most likely to be on this job's critical path, so it runs before older backlog.
/// `queued_ids` dedups while an envelope sits in the queue so a retransmitted hop never
/// gets processed twice concurrently; the id is freed the moment a worker pops it, not
/// when processing finishes, matching the tracker's own idempotent-completion model
/// rather than duplicating it here.
struct Queue {
    items: Mutex<VecDeque<LayerJob>>,
    queued_ids: DashSet<JobId>,
    notify: Notify,
}

impl Queue {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            queued_ids: DashSet::new(),
            notify: Notify::new(),
        }
    }

    fn push(&self, envelope: LayerJob) -> bool {
        if !self.queued_ids.insert(envelope.job_id) {
            return false;
        }
        self.items.lock().push_front(envelope);
        self.notify.notify_one();
        true
    }

    async fn pop(&self) -> LayerJob {
        loop {
            if let Some(envelope) = self.items.lock().pop_front() {
                self.queued_ids.remove(&envelope.job_id);
                return envelope;
            }
            self.notify.notified().await;
        }
    }
}

const WORKER_COUNT: usize = 4;

/// The `POST /jobs` ingress: decodes, verifies, dedups, and hands each envelope to a
/// fixed pool of workers driving the job processor FSM. A state-hash mismatch never
/// reaches the queue at all; it is bounced back to the envelope's origin for a restart
/// on the spot.
pub struct JobReceiver {
    ctx: Arc<JobContext>,
    queue: Arc<Queue>,
}

impl JobReceiver {
    pub fn new(ctx: Arc<JobContext>) -> Arc<Self> {
        let queue = Arc::new(Queue::new());
        for worker in 0..WORKER_COUNT {
            let queue = queue.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                loop {
                    let envelope = queue.pop().await;
                    debug!(worker, job_id = %envelope.job_id, "dequeued envelope");
                    JobProcessor::run(ctx.clone(), envelope).await;
                }
            });
        }
        Arc::new(Self { ctx, queue })
    }

    async fn bounce(&self, mut envelope: LayerJob) {
        let origin = envelope.origin_node_id;
        if let Some(layer_model) = &self.ctx.layer_model {
            layer_model.clear_cache(envelope.job_id);
        }
        envelope.restart = true;
        envelope.compute_step = ComputeStep::Embed;
        envelope.current_layer = 0;
        envelope.data = JobData::default();
        envelope.seal_state_hash();
        if let Err(e) = self.ctx.transport.send_job(&envelope, origin).await {
            warn!(job_id = %envelope.job_id, error = %e, "failed to bounce corrupted envelope back to origin");
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/jobs", post(submit_job)).with_state(self)
    }
}

async fn submit_job(State(receiver): State<Arc<JobReceiver>>, body: axum::body::Bytes) -> StatusCode {
    let envelope = match LayerJob::decode(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "rejected malformed envelope");
            return StatusCode::BAD_REQUEST;
        }
    };

    if let Err(e) = envelope.verify_state_hash() {
        warn!(job_id = %envelope.job_id, error = %e, "state hash mismatch, bouncing to origin for restart");
        receiver.bounce(envelope).await;
        return StatusCode::OK;
    }

    if !receiver.queue.push(envelope) {
        debug!("duplicate envelope for already-queued job dropped");
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tensorpipe_core::{ModelId, NodeId, PipeId};
    use tensorpipe_model::{ReferenceEndModel, ReferenceLayerModel};
    use tensorpipe_topology::{Pipe, PipeRegistry, Transport};
    use tensorpipe_wire::{ChatMessage, SamplingParams};

    struct RecordingTransport {
        sent: Mutex<Vec<NodeId>>,
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn send_job(
            &self,
            _envelope: &LayerJob,
            dest: NodeId,
        ) -> tensorpipe_topology::Result<()> {
            self.sent.lock().push(dest);
            Ok(())
        }
    }

    fn envelope_for(origin: NodeId, pipe_id: PipeId) -> LayerJob {
        let mut envelope = LayerJob {
            job_id: JobId::generate(),
            origin_node_id: origin,
            pipe_id,
            model_id: ModelId::new("m"),
            messages: vec![ChatMessage {
                role: tensorpipe_wire::Role::User,
                content: "hi".into(),
            }],
            input_ids: vec![1, 2, 3],
            prompt_tokens: 3,
            max_completion_tokens: 8,
            sampling: SamplingParams::default(),
            compute_step: ComputeStep::Embed,
            current_layer: 0,
            current_token: 0,
            restart: false,
            data: JobData::default(),
            state_hash: None,
        };
        envelope.data.state = Some(
            tensorpipe_wire::TensorBlob::new(tensorpipe_wire::DType::F32, vec![1], vec![0, 0, 128, 63])
                .unwrap(),
        );
        envelope.seal_state_hash();
        envelope
    }

    #[tokio::test]
    async fn tampered_envelope_is_bounced_instead_of_queued() {
        let self_node = NodeId::generate();
        let origin = NodeId::generate();
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });
        let ctx = JobContext::new(
            self_node,
            6,
            crate::tracker::JobTracker::new(Duration::from_secs(10), Duration::from_secs(60), None),
            Arc::new(PipeRegistry::new()),
            Some(Arc::new(ReferenceEndModel::new(8))),
            Some(Arc::new(ReferenceLayerModel::new())),
            transport.clone(),
        );
        let receiver = JobReceiver::new(ctx);

        let mut envelope = envelope_for(origin, PipeId::new("p"));
        envelope.data.state.as_mut().unwrap().data[0] = 1;
        let body = envelope.encode().unwrap();

        let status = submit_job(State(receiver), axum::body::Bytes::from(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(transport.sent.lock().as_slice(), &[origin]);
    }

    #[tokio::test]
    async fn duplicate_job_id_is_not_queued_twice() {
        let self_node = NodeId::generate();
        let pipes = Arc::new(PipeRegistry::new());
        pipes.insert(Pipe::new(PipeId::new("p"), ModelId::new("m"), 0, self_node, vec![]));
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });
        let ctx = JobContext::new(
            self_node,
            6,
            crate::tracker::JobTracker::new(Duration::from_secs(10), Duration::from_secs(60), None),
            pipes,
            Some(Arc::new(ReferenceEndModel::new(8))),
            Some(Arc::new(ReferenceLayerModel::new())),
            transport,
        );
        let receiver = JobReceiver::new(ctx);
        let envelope = envelope_for(self_node, PipeId::new("p"));

        assert!(receiver.queue.push(envelope.clone()));
        assert!(!receiver.queue.push(envelope));
    }
}
