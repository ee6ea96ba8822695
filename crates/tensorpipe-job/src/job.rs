use tensorpipe_core::{JobId, ModelId, NodeId, PipeId};
use tensorpipe_wire::{ChatMessage, ComputeStep, JobData, LayerJob, SamplingParams};

use crate::chunk_state::ChunkState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Completed,
}

/// The per-request state a node holds while it is actively processing one pass, or
/// while the origin is waiting on the rest of the pipe. Callbacks, the KV cache handle
/// and the wall-clock bookkeeping the tracker needs are deliberately not here; they live
/// in `PendingJob`, which wraps a `Job` the way the origin's tracker wraps it, so a job
/// handed off to the wire carries only what `LayerJob` itself carries.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: JobId,
    pub origin_node_id: NodeId,
    pub pipe_id: PipeId,
    pub model_id: ModelId,
    pub messages: Vec<ChatMessage>,
    pub input_ids: Vec<i64>,
    pub prompt_tokens: u32,
    pub current_token: u32,
    pub max_completion_tokens: u32,
    pub sampling: SamplingParams,
    pub compute_step: ComputeStep,
    pub current_layer: u32,
    pub data: JobData,
    pub chunking: ChunkState,
    pub status: JobStatus,
    pub restart: bool,
    pub delta: String,
    pub result: Option<String>,
}

impl Job {
    pub fn new(
        job_id: JobId,
        origin_node_id: NodeId,
        pipe_id: PipeId,
        model_id: ModelId,
        messages: Vec<ChatMessage>,
        max_completion_tokens: u32,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            job_id,
            origin_node_id,
            pipe_id,
            model_id,
            messages,
            input_ids: Vec::new(),
            prompt_tokens: 0,
            current_token: 0,
            max_completion_tokens,
            sampling,
            compute_step: ComputeStep::Tokenize,
            current_layer: 0,
            data: JobData::default(),
            chunking: ChunkState::new(),
            status: JobStatus::InProgress,
            restart: false,
            delta: String::new(),
            result: None,
        }
    }

    pub fn to_layer_job(&self) -> LayerJob {
        let mut envelope = LayerJob {
            job_id: self.job_id,
            origin_node_id: self.origin_node_id,
            pipe_id: self.pipe_id.clone(),
            model_id: self.model_id.clone(),
            messages: self.messages.clone(),
            input_ids: self.input_ids.clone(),
            prompt_tokens: self.prompt_tokens,
            max_completion_tokens: self.max_completion_tokens,
            sampling: self.sampling,
            compute_step: self.compute_step,
            current_layer: self.current_layer,
            current_token: self.current_token,
            restart: self.restart,
            data: self.data.clone(),
            state_hash: None,
        };
        envelope.seal_state_hash();
        envelope
    }

    pub fn from_layer_job(envelope: LayerJob) -> Self {
        Self {
            job_id: envelope.job_id,
            origin_node_id: envelope.origin_node_id,
            pipe_id: envelope.pipe_id,
            model_id: envelope.model_id,
            messages: envelope.messages,
            input_ids: envelope.input_ids,
            prompt_tokens: envelope.prompt_tokens,
            current_token: envelope.current_token,
            max_completion_tokens: envelope.max_completion_tokens,
            sampling: envelope.sampling,
            compute_step: envelope.compute_step,
            current_layer: envelope.current_layer,
            data: envelope.data,
            chunking: ChunkState::new(),
            status: JobStatus::InProgress,
            restart: envelope.restart,
            delta: String::new(),
            result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::new(
            JobId::generate(),
            NodeId::generate(),
            PipeId::new("p1"),
            ModelId::new("m"),
            vec![],
            16,
            SamplingParams::default(),
        )
    }

    #[test]
    fn layer_job_round_trip_preserves_identity_and_cursor() {
        let mut job = sample_job();
        job.current_layer = 3;
        job.input_ids = vec![1, 2, 3];
        let envelope = job.to_layer_job();
        let restored = Job::from_layer_job(envelope);
        assert_eq!(restored.job_id, job.job_id);
        assert_eq!(restored.current_layer, 3);
        assert_eq!(restored.input_ids, vec![1, 2, 3]);
    }
}
