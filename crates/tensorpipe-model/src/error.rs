use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("layer forward failed: {0}")]
    Forward(String),

    #[error("required tensor {0} missing from job data")]
    MissingTensor(&'static str),
}

pub type Result<T> = std::result::Result<T, ModelError>;
