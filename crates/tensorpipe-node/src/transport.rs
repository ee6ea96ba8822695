use std::sync::Arc;

use async_trait::async_trait;
use tensorpipe_core::NodeId;
use tensorpipe_topology::{NetworkDirectory, Result, Transport, TopologyError};
use tensorpipe_wire::LayerJob;
use tracing::debug;

/// Delivers envelopes to their next hop over plain HTTP, resolving the destination's
/// address through a `NetworkDirectory`. A node's own address is never looked up this
/// way: the bootstrap envelope a `JobFactory` sends to itself is expected to loop back
/// to this same process's receiver, so the directory only needs entries for peers.
pub struct ReqwestTransport {
    client: reqwest::Client,
    directory: Arc<dyn NetworkDirectory>,
    self_node_id: NodeId,
    self_job_port: u16,
}

impl ReqwestTransport {
    pub fn new(directory: Arc<dyn NetworkDirectory>, self_node_id: NodeId, self_job_port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            directory,
            self_node_id,
            self_job_port,
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send_job(&self, envelope: &LayerJob, dest: NodeId) -> Result<()> {
        let (address, port) = if dest == self.self_node_id {
            ("127.0.0.1".parse().unwrap(), self.self_job_port)
        } else {
            let address = self
                .directory
                .address(dest)
                .ok_or_else(|| TopologyError::SendFailed(format!("no address for node {dest}")))?;
            let port = self
                .directory
                .job_port(dest)
                .ok_or_else(|| TopologyError::SendFailed(format!("no job port for node {dest}")))?;
            (address, port)
        };

        let body = envelope
            .encode()
            .map_err(|e| TopologyError::SendFailed(e.to_string()))?;
        let url = format!("http://{address}:{port}/jobs");
        debug!(job_id = %envelope.job_id, %url, "sending envelope");

        let response = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| TopologyError::SendFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TopologyError::SendFailed(format!(
                "peer returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TopologyError::SendFailed(e.to_string()))?;
        if &body[..] == &b"DOWN"[..] {
            return Err(TopologyError::SendFailed(format!("peer {dest} signalled DOWN")));
        }

        Ok(())
    }
}
