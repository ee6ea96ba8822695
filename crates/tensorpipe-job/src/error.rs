use tensorpipe_core::{JobId, ModelId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("no pipe available for model {0}")]
    NoPipe(ModelId),

    #[error("pipe incomplete for model {0}")]
    PipeIncomplete(ModelId),

    #[error("no end model resident for model {0}")]
    NoEndModel(ModelId),

    #[error(transparent)]
    Wire(#[from] tensorpipe_wire::WireError),

    #[error(transparent)]
    Topology(#[from] tensorpipe_topology::TopologyError),

    #[error(transparent)]
    Model(#[from] tensorpipe_model::ModelError),

    #[error("job {0} expired before completion")]
    Stale(JobId),

    #[error("send to next hop failed: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, JobError>;

/// The terminal outcome handed to a job's `resolve` callback. `Ok` carries the
/// completed job's final text; every other variant is a caller-visible failure that
/// never unwinds out of the FSM worker itself.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed { result: String },
    NoPipe,
    PipeIncomplete,
    NoEndModel,
    Stale,
    SendFailed,
}
