use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for one node daemon. `node_id` is generated fresh unless a
/// previous run's id was persisted to `data_dir`; every other field has a sensible
/// default a single-box demo never needs to override.
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub job_port: u16,
    pub prefill_chunk_size: u32,
    pub check_interval: Duration,
    pub expired_job_time: Duration,
}

impl NodeConfig {
    pub fn new(data_dir: Option<String>, job_port: u16, prefill_chunk_size: u32) -> Self {
        let data_dir = data_dir.map(PathBuf::from).unwrap_or_else(|| {
            directories::ProjectDirs::from("rs", "tensorpipe", "tensorpiped")
                .map(|d| d.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".tensorpipe"))
        });

        Self {
            data_dir,
            job_port,
            prefill_chunk_size,
            check_interval: tensorpipe_job::DEFAULT_CHECK_INTERVAL,
            expired_job_time: tensorpipe_job::DEFAULT_EXPIRED_JOB_TIME,
        }
    }
}
