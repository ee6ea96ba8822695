mod envelope;
mod error;
mod job_data;
mod tensor;

pub use envelope::{ChatMessage, ComputeStep, LayerJob, Role, SamplingParams};
pub use error::{Result, WireError};
pub use job_data::JobData;
pub use tensor::{DType, TensorBlob};
