//! Cluster topology: the ordered peer list a coordinator fans out to.

use crate::rf::ReplicaFactor;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("cluster address has no parseable port: {0}")]
    MissingPort(String),
    #[error("replica spec needs {needed} peers but only {available} are configured")]
    NotEnoughPeers { needed: usize, available: usize },
}

/// Peer base URLs, local node excluded, sorted lexicographically so that
/// "the first K replicas" is the same subset on every node and for every
/// repeated request.
#[derive(Debug, Clone)]
pub struct Topology {
    peers: Vec<String>,
}

impl Topology {
    /// Build from the full cluster list. The local node is identified by
    /// its listen port and skipped.
    pub fn from_cluster(cluster: &[String], local_port: u16) -> Result<Self, TopologyError> {
        let mut peers = Vec::with_capacity(cluster.len().saturating_sub(1));
        for addr in cluster {
            let addr = addr.trim_end_matches('/');
            if peer_port(addr)? == local_port {
                continue;
            }
            peers.push(addr.to_string());
        }
        peers.sort_unstable();
        Ok(Self { peers })
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Cluster size: every known peer plus the local node.
    pub fn node_count(&self) -> usize {
        self.peers.len() + 1
    }

    /// The quorum used when a request carries no replica override.
    pub fn default_rf(&self) -> ReplicaFactor {
        ReplicaFactor::quorum(self.node_count())
    }

    /// The peers to contact for `rf`: the first `from - 1` of the sorted
    /// list, the coordinator itself being the remaining participant.
    /// Asking for more peers than the cluster holds is a client error,
    /// never an out-of-range access.
    pub fn select(&self, rf: &ReplicaFactor) -> Result<&[String], TopologyError> {
        let needed = rf.from() - 1;
        if needed > self.peers.len() {
            return Err(TopologyError::NotEnoughPeers {
                needed,
                available: self.peers.len(),
            });
        }
        Ok(&self.peers[..needed])
    }
}

fn peer_port(addr: &str) -> Result<u16, TopologyError> {
    addr.rsplit(':')
        .next()
        .and_then(|port| port.parse().ok())
        .ok_or_else(|| TopologyError::MissingPort(addr.to_string()))
}
