mod chunk_state;
mod context;
mod error;
mod factory;
mod job;
mod processor;
mod receiver;
mod tracker;

pub use chunk_state::ChunkState;
pub use context::JobContext;
pub use error::{JobError, JobOutcome, Result};
pub use factory::JobFactory;
pub use job::{Job, JobStatus};
pub use processor::JobProcessor;
pub use receiver::JobReceiver;
pub use tracker::{
    log_tracker_defaults, JobTracker, PendingJob, ResolveCallback, UpdateCallback,
    DEFAULT_CHECK_INTERVAL, DEFAULT_EXPIRED_JOB_TIME,
};
