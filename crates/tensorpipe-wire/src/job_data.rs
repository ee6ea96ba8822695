use serde::{Deserialize, Serialize};

use crate::tensor::TensorBlob;

/// The activation carried between nodes for one layer hop. Every field is optional
/// because a job in `TOKENIZE`/`VALIDATING` has no data yet; once `compute_embed` runs,
/// `state` and the derived fields below are always populated together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobData {
    pub state: Option<TensorBlob>,
    pub position_ids: Option<TensorBlob>,
    pub cache_position: Option<TensorBlob>,
    pub causal_mask: Option<TensorBlob>,
    pub causal_mask_sliding: Option<TensorBlob>,
    /// Rotary cos/sin pair, packed as a single two-row tensor (row 0 = cos, row 1 = sin).
    pub position_embeddings: Option<TensorBlob>,
}

impl JobData {
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
    }

    pub fn clear(&mut self) {
        *self = JobData::default();
    }
}
