use tracing_subscriber::EnvFilter;

/// Initializes the process-wide tracing subscriber. Honors `RUST_LOG`, defaulting to
/// `info` so a freshly started node is quiet but not silent.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
