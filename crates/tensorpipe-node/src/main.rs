use std::sync::Arc;

use clap::Parser;
use tracing::info;

use tensorpipe_core::{ModelId, NodeId, PipeId};
use tensorpipe_job::{JobContext, JobReceiver, JobTracker};
use tensorpipe_model::{ReferenceEndModel, ReferenceLayerModel};
use tensorpipe_topology::{InMemoryNetworkDirectory, Pipe, PipeRegistry, Segment};

mod config;
mod transport;

use config::NodeConfig;
use transport::ReqwestTransport;

#[derive(Parser)]
#[command(name = "tensorpiped")]
#[command(about = "tensorpipe node daemon: joins a pipeline and serves job envelopes", long_about = None)]
struct Cli {
    /// HTTP port the job receiver listens on
    #[arg(short, long, default_value = "7700")]
    job_port: u16,

    /// Data directory for node identity and future persisted state
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Prefill chunk size, in tokens
    #[arg(long, default_value = "6")]
    prefill_chunk_size: u32,

    /// Model id this node serves a standalone, reference-backed pipe for
    #[arg(long, default_value = "demo")]
    model_id: String,

    /// Hidden layer count for the standalone reference pipe
    #[arg(long, default_value = "4")]
    num_hidden_layers: u32,

    /// Hidden size for the reference end model's embeddings
    #[arg(long, default_value = "8")]
    hidden_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tensorpipe_core::init_tracing();

    let cli = Cli::parse();
    let config = NodeConfig::new(cli.data_dir, cli.job_port, cli.prefill_chunk_size);

    let self_node_id = NodeId::generate();
    info!(node_id = %self_node_id, job_port = config.job_port, "starting node");

    let directory = Arc::new(InMemoryNetworkDirectory::new());
    directory.publish(self_node_id, "127.0.0.1".parse().unwrap(), config.job_port);

    let pipes = Arc::new(PipeRegistry::new());
    let model_id = ModelId::new(cli.model_id);
    pipes.insert(Pipe::new(
        PipeId::new(model_id.as_str()),
        model_id,
        cli.num_hidden_layers,
        self_node_id,
        vec![Segment::Local {
            node_id: self_node_id,
            start_layer: 0,
            end_layer: cli.num_hidden_layers.saturating_sub(1),
            loaded: true,
        }],
    ));

    let layer_model = Arc::new(ReferenceLayerModel::new());
    let tracker = JobTracker::new(config.check_interval, config.expired_job_time, Some(layer_model.clone()));
    let sweep_handle = tracker.spawn_sweep();

    let transport = Arc::new(ReqwestTransport::new(directory, self_node_id, config.job_port));

    let ctx = JobContext::new(
        self_node_id,
        config.prefill_chunk_size,
        tracker,
        pipes,
        Some(Arc::new(ReferenceEndModel::new(cli.hidden_size))),
        Some(layer_model),
        transport,
    );

    let receiver = JobReceiver::new(ctx);
    let app = receiver.router();
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.job_port)).await?;
    info!(data_dir = %config.data_dir.display(), "job receiver listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    sweep_handle.abort();
    Ok(())
}
