use std::net::IpAddr;

use dashmap::DashMap;
use tensorpipe_core::NodeId;

/// The node-to-network metadata the overlay publishes for each node: at minimum an
/// address and the port its job receiver listens on. The overlay itself (peer discovery,
/// authenticated messaging) is out of scope here; this trait is the seam a real
/// implementation plugs into.
pub trait NetworkDirectory: Send + Sync {
    fn address(&self, node: NodeId) -> Option<IpAddr>;
    fn job_port(&self, node: NodeId) -> Option<u16>;
}

/// An in-memory directory sufficient for single-process and localhost-multi-process
/// testing. Entries are published by whoever starts a node, mirroring the overlay's
/// key/value record for `job_port`.
#[derive(Debug, Default)]
pub struct InMemoryNetworkDirectory {
    entries: DashMap<NodeId, (IpAddr, u16)>,
}

impl InMemoryNetworkDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, node: NodeId, address: IpAddr, job_port: u16) {
        self.entries.insert(node, (address, job_port));
    }
}

impl NetworkDirectory for InMemoryNetworkDirectory {
    fn address(&self, node: NodeId) -> Option<IpAddr> {
        self.entries.get(&node).map(|e| e.0)
    }

    fn job_port(&self, node: NodeId) -> Option<u16> {
        self.entries.get(&node).map(|e| e.1)
    }
}
