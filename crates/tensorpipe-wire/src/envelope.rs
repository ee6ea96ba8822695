use serde::{Deserialize, Serialize};
use tensorpipe_core::{JobId, ModelId, NodeId, PipeId};

use crate::error::{Result, WireError};
use crate::job_data::JobData;
use crate::tensor::TensorBlob;

/// Chat turn role, matching the ingress contract's message shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Where a job's compute cursor sits. Persisted on the envelope and resumed by whichever
/// node receives it next; distinct from the job processor's transient FSM states
/// (`VALIDATING`/`SEND`/`DONE`), which never leave a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeStep {
    Tokenize,
    Embed,
    Layer,
    Norm,
    Head,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub min_p: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 0,
            top_p: 1.0,
            min_p: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// The on-wire envelope handed from one node to the next. Self-delimited by the
/// transport's length prefix; decoding fails closed (`WireError::MalformedEnvelope`) on
/// truncation or an inconsistent tensor shape, and `verify_state_hash` catches in-flight
/// corruption of the activation itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerJob {
    pub job_id: JobId,
    pub origin_node_id: NodeId,
    pub pipe_id: PipeId,
    pub model_id: ModelId,
    pub messages: Vec<ChatMessage>,
    pub input_ids: Vec<i64>,
    pub prompt_tokens: u32,
    pub max_completion_tokens: u32,
    pub sampling: SamplingParams,
    pub compute_step: ComputeStep,
    pub current_layer: u32,
    pub current_token: u32,
    pub restart: bool,
    pub data: JobData,
    pub state_hash: Option<[u8; 32]>,
}

impl LayerJob {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| WireError::MalformedEnvelope(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let job: LayerJob =
            bincode::deserialize(bytes).map_err(|e| WireError::MalformedEnvelope(e.to_string()))?;
        if let Some(state) = &job.data.state {
            state
                .validate()
                .map_err(|e| WireError::MalformedEnvelope(e.to_string()))?;
        }
        Ok(job)
    }

    /// Recomputes the digest that should accompany `data.state` and stores it.
    pub fn seal_state_hash(&mut self) {
        self.state_hash = self.data.state.as_ref().map(hash_tensor);
    }

    /// Checks the digest carried alongside `data.state` against the payload actually
    /// received. A job with no state carries no hash and always verifies.
    pub fn verify_state_hash(&self) -> Result<()> {
        match (&self.data.state, self.state_hash) {
            (None, _) => Ok(()),
            (Some(state), Some(expected)) => {
                let actual = hash_tensor(state);
                if actual == expected {
                    Ok(())
                } else {
                    Err(WireError::HashMismatch {
                        expected: hex_digest(&expected),
                        actual: hex_digest(&actual),
                    })
                }
            }
            (Some(state), None) => Err(WireError::HashMismatch {
                expected: "<none>".to_string(),
                actual: hex_digest(&hash_tensor(state)),
            }),
        }
    }
}

fn hash_tensor(blob: &TensorBlob) -> [u8; 32] {
    *blake3::hash(&blob.data).as_bytes()
}

fn hex_digest(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;

    fn sample_job() -> LayerJob {
        LayerJob {
            job_id: JobId::generate(),
            origin_node_id: NodeId::generate(),
            pipe_id: PipeId::new("pipe-a"),
            model_id: ModelId::new("tiny-llm"),
            messages: vec![ChatMessage {
                role: Role::User,
                content: "hi".to_string(),
            }],
            input_ids: vec![1, 2, 3],
            prompt_tokens: 3,
            max_completion_tokens: 16,
            sampling: SamplingParams::default(),
            compute_step: ComputeStep::Embed,
            current_layer: 0,
            current_token: 0,
            restart: false,
            data: JobData::default(),
            state_hash: None,
        }
    }

    #[test]
    fn roundtrips_through_encode_decode() {
        let job = sample_job();
        let bytes = job.encode().unwrap();
        let back = LayerJob::decode(&bytes).unwrap();
        assert_eq!(job.job_id, back.job_id);
        assert_eq!(job.input_ids, back.input_ids);
        assert_eq!(job.compute_step, back.compute_step);
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        let job = sample_job();
        let bytes = job.encode().unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(
            LayerJob::decode(truncated),
            Err(WireError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn hash_matches_for_untampered_state() {
        let mut job = sample_job();
        job.data.state = Some(TensorBlob::new(DType::F32, vec![1], vec![0, 0, 128, 63]).unwrap());
        job.seal_state_hash();
        assert!(job.verify_state_hash().is_ok());
    }

    #[test]
    fn hash_mismatch_detected_on_tamper() {
        let mut job = sample_job();
        job.data.state = Some(TensorBlob::new(DType::F32, vec![1], vec![0, 0, 128, 63]).unwrap());
        job.seal_state_hash();
        job.data.state.as_mut().unwrap().data[0] = 1;
        assert!(matches!(
            job.verify_state_hash(),
            Err(WireError::HashMismatch { .. })
        ));
    }

    #[test]
    fn job_with_no_state_always_verifies() {
        let job = sample_job();
        assert!(job.verify_state_hash().is_ok());
    }
}
