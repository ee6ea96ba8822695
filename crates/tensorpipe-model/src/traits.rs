use async_trait::async_trait;
use tensorpipe_wire::JobData;

use crate::error::Result;

/// One step of generation state as the model traits see it: just enough to run
/// tokenize/embed/norm/head or a layer forward without depending on the job crate's
/// richer `Job` aggregate (avoiding a dependency cycle between `tensorpipe-model` and
/// `tensorpipe-job`).
pub struct ModelStep<'a> {
    pub input_ids: &'a [i64],
    pub prompt_tokens: u32,
    pub current_token: u32,
    pub data: JobData,
}

pub struct EmbedOutput {
    pub data: JobData,
}

pub struct HeadOutput {
    pub sampled_token: i64,
    pub is_eos: bool,
}

/// Capability interface for the node that owns embedding/output for a model. Exactly one
/// resident implementation per model per node; tensor math itself is a pure-function
/// collaborator behind this trait, not something this repository reimplements.
#[async_trait]
pub trait EndModel: Send + Sync {
    /// Tokenizes the chat messages into `input_ids` using the model's chat template.
    fn tokenize(&self, messages: &[tensorpipe_wire::ChatMessage]) -> Result<Vec<i64>>;

    /// Produces the hidden state for `input_ids[range]` (prefill) or the single last
    /// token (decode, when `range` covers only the final position).
    async fn compute_embed(&self, step: &ModelStep<'_>, range: (usize, usize)) -> Result<EmbedOutput>;

    /// Applies the final norm to `data.state` in place.
    async fn compute_norm(&self, data: &mut JobData) -> Result<()>;

    /// Projects the normed state to logits, samples a token, and reports whether it's EOS.
    async fn compute_head(
        &self,
        data: &JobData,
        input_ids: &[i64],
        sampling: &tensorpipe_wire::SamplingParams,
    ) -> Result<HeadOutput>;

    /// Decodes the generated suffix of `input_ids` (everything after `prompt_tokens`)
    /// into the final text result.
    fn set_result(&self, input_ids: &[i64], prompt_tokens: u32) -> Result<String>;

    fn eos_token_id(&self) -> i64;

    fn num_hidden_layers(&self) -> u32;
}

/// Capability interface for a node that owns a contiguous range of decoder layers.
#[async_trait]
pub trait LayerModel: Send + Sync {
    /// Runs the forward pass for every layer in `[start_layer, end_layer]` in order,
    /// mutating `data.state` and updating this node's KV cache slice for the job.
    async fn process_job(
        &self,
        job_id: tensorpipe_core::JobId,
        data: &mut JobData,
        start_layer: u32,
        end_layer: u32,
    ) -> Result<()>;

    /// Drops whatever KV cache state this node holds for `job_id`, used on restart after
    /// a detected corruption and on ordinary job completion/expiry.
    fn clear_cache(&self, job_id: tensorpipe_core::JobId);
}
