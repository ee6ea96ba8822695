use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("state hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("tensor blob shape {shape:?} does not match byte length {len} for dtype {dtype:?}")]
    ShapeMismatch {
        shape: Vec<usize>,
        dtype: crate::tensor::DType,
        len: usize,
    },
}

pub type Result<T> = std::result::Result<T, WireError>;
