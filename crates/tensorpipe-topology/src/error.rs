use thiserror::Error;
use tensorpipe_core::{ModelId, PipeId};

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("no pipe registered for model {0}")]
    NoPipe(ModelId),

    #[error("pipe {0} is missing segment coverage for the model's layers")]
    PipeIncomplete(PipeId),

    #[error("no end model is resident for model {0}")]
    NoEndModel(ModelId),

    #[error("send to peer failed: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
