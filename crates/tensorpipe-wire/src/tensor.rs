use serde::{Deserialize, Serialize};

use crate::error::{Result, WireError};

/// Element type of a tensor blob. Only what the job pipeline actually moves over the
/// wire; real model math may use more, but those tensors never leave the compute kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    Bool,
}

impl DType {
    pub fn element_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::Bool => 1,
        }
    }
}

/// A single tensor carried in a `JobData` payload: dtype tag, shape, and contiguous
/// row-major bytes. An absent tensor is represented by `None` at the `JobData` level, not
/// by an empty `TensorBlob` — callers never have to special-case a zero-length blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorBlob {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl TensorBlob {
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let blob = Self { dtype, shape, data };
        blob.validate()?;
        Ok(blob)
    }

    pub fn validate(&self) -> Result<()> {
        let expected_elems: usize = self.shape.iter().product();
        let expected_len = expected_elems * self.dtype.element_size();
        if expected_len != self.data.len() {
            return Err(WireError::ShapeMismatch {
                shape: self.shape.clone(),
                dtype: self.dtype,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}
