mod error;
mod ids;
mod logging;

pub use error::{CoreError, Result};
pub use ids::{JobId, ModelId, NodeId, PipeId};
pub use logging::init_tracing;
