//! Remote command abstraction.
//!
//! A [`RemoteCommand`] is one KV operation against one named peer. It is
//! executed through the [`ReplicaClient`] trait so the wire transport
//! stays a black box to the replication logic (the HTTP implementation
//! lives in `replikv-net`; tests use mocks).
//!
//! Failure never crosses the command boundary: a peer that is down,
//! times out, answers with an unexpected status, or returns a body the
//! codec rejects is reduced to a negative reply — an `Error`-state
//! record for reads, a `false` ack for writes — and counted by the
//! coordinator like any other answer.

use replikv_storage::{StoreError, TruncatedRecord, VersionedRecord};
use std::sync::Arc;

/// Header marking replica-to-replica traffic. A request carrying it is
/// served from the local store only, so fan-out can never recurse.
pub const INTERNAL_MARKER_HEADER: &str = "x-replikv-internal";

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),
    #[error("malformed record body: {0}")]
    MalformedBody(#[from] TruncatedRecord),
}

/// Transport for replica-to-replica calls.
#[async_trait::async_trait]
pub trait ReplicaClient: Send + Sync + 'static {
    /// Fetch the peer's versioned record for a key (its serialised form,
    /// timestamp included — the coordinator needs it to reduce).
    async fn replica_get(&self, peer: &str, key: &str) -> Result<VersionedRecord, ReplicaError>;

    /// Store a live value on the peer. `Ok(true)` iff the peer acked.
    async fn replica_put(
        &self,
        peer: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<bool, ReplicaError>;

    /// Write a tombstone on the peer. `Ok(true)` iff the peer acked.
    async fn replica_delete(&self, peer: &str, key: &str) -> Result<bool, ReplicaError>;
}

/// One unit of fan-out work: an operation kind plus the fields it needs.
#[derive(Debug, Clone)]
pub enum RemoteCommand {
    Get {
        peer: String,
        key: String,
    },
    Put {
        peer: String,
        key: String,
        payload: Vec<u8>,
    },
    Delete {
        peer: String,
        key: String,
    },
}

/// What one participant answered. `Fault` is reserved for the local
/// store: a remote failure is already reduced to `Record(Error)` or
/// `Ack(false)` at the command boundary, while a local storage fault is
/// an internal error the request must surface.
#[derive(Debug)]
pub enum CommandReply {
    Record(VersionedRecord),
    Ack(bool),
    Fault(StoreError),
}

impl RemoteCommand {
    /// Run the command against its peer, reducing any failure to a
    /// negative reply.
    pub async fn execute<C: ReplicaClient>(self, client: Arc<C>) -> CommandReply {
        match self {
            Self::Get { peer, key } => match client.replica_get(&peer, &key).await {
                Ok(record) => CommandReply::Record(record),
                Err(err) => {
                    tracing::warn!(peer = %peer, key = %key, error = %err, "replica get failed");
                    CommandReply::Record(VersionedRecord::Error)
                }
            },
            Self::Put { peer, key, payload } => {
                match client.replica_put(&peer, &key, &payload).await {
                    Ok(acked) => CommandReply::Ack(acked),
                    Err(err) => {
                        tracing::warn!(peer = %peer, key = %key, error = %err, "replica put failed");
                        CommandReply::Ack(false)
                    }
                }
            }
            Self::Delete { peer, key } => match client.replica_delete(&peer, &key).await {
                Ok(acked) => CommandReply::Ack(acked),
                Err(err) => {
                    tracing::warn!(peer = %peer, key = %key, error = %err, "replica delete failed");
                    CommandReply::Ack(false)
                }
            },
        }
    }
}
