//! Replication coordinator: turns one client request into a concurrent
//! batch of replica commands plus a local operation, then reduces the
//! answers into a single outcome.
//!
//! Reduction is order-independent by design. Reads pick the winning
//! record by write timestamp (last-write-wins) and check how many
//! participants answered at all; writes just count positive acks. The
//! coordinator never sees internal replica-to-replica requests — the
//! HTTP layer serves those from the local store directly, which is what
//! keeps fan-out from recursing.

use crate::command::{CommandReply, RemoteCommand, ReplicaClient};
use crate::dispatcher::Dispatcher;
use crate::rf::ReplicaFactor;
use crate::topology::{Topology, TopologyError};
use futures::future::BoxFuture;
use replikv_storage::{LocalStore, StoreError, VersionedRecord};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CoordinateError {
    /// The replica spec cannot be satisfied by this cluster. A client
    /// error, not a server fault.
    #[error("replica selection failed: {0}")]
    Selection(#[from] TopologyError),
    /// The local store failed or holds corrupt bytes. A server fault.
    #[error("local storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Outcome of a coordinated read.
#[derive(Debug, PartialEq, Eq)]
pub enum GetOutcome {
    Found(Vec<u8>),
    NotFound,
    /// Too few participants reachable for the requested quorum.
    Unreachable,
}

/// Outcome of a coordinated put or delete.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Unreachable,
}

pub struct Coordinator<C: ReplicaClient> {
    store: Arc<LocalStore>,
    topology: Topology,
    client: Arc<C>,
    dispatcher: Arc<Dispatcher>,
}

impl<C: ReplicaClient> std::fmt::Debug for Coordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl<C: ReplicaClient> Coordinator<C> {
    pub fn new(
        store: Arc<LocalStore>,
        topology: Topology,
        client: Arc<C>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            store,
            topology,
            client,
            dispatcher,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Coordinated read: fan out, reduce by last-write-wins, enforce the
    /// ack threshold.
    pub async fn get(
        &self,
        key: &str,
        rf: Option<ReplicaFactor>,
    ) -> Result<GetOutcome, CoordinateError> {
        let rf = rf.unwrap_or_else(|| self.topology.default_rf());
        let peers = self.topology.select(&rf)?.to_vec();

        let mut batch: Vec<BoxFuture<'static, CommandReply>> = Vec::with_capacity(peers.len() + 1);
        for peer in peers {
            let command = RemoteCommand::Get {
                peer,
                key: key.to_string(),
            };
            batch.push(Box::pin(command.execute(self.client.clone())));
        }

        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();
        batch.push(Box::pin(async move {
            match store.get(&key_bytes) {
                Ok(record) => CommandReply::Record(record),
                Err(err) => CommandReply::Fault(err),
            }
        }));

        let replies = self.dispatcher.process(batch).await;
        let mut records = Vec::with_capacity(replies.len());
        for reply in replies {
            match reply {
                CommandReply::Record(record) => records.push(record),
                CommandReply::Fault(err) => return Err(err.into()),
                CommandReply::Ack(_) => {}
            }
        }

        let outcome = reduce_get(&rf, records);
        if outcome == GetOutcome::Unreachable {
            replikv_metrics::metrics()
                .quorum_failures
                .with_label_values(&["get"])
                .inc();
        }
        Ok(outcome)
    }

    /// Coordinated write of a live value.
    pub async fn put(
        &self,
        key: &str,
        payload: Vec<u8>,
        rf: Option<ReplicaFactor>,
    ) -> Result<WriteOutcome, CoordinateError> {
        self.write(key, Some(payload), rf).await
    }

    /// Coordinated delete: a tombstone write on every participant.
    pub async fn delete(
        &self,
        key: &str,
        rf: Option<ReplicaFactor>,
    ) -> Result<WriteOutcome, CoordinateError> {
        self.write(key, None, rf).await
    }

    async fn write(
        &self,
        key: &str,
        payload: Option<Vec<u8>>,
        rf: Option<ReplicaFactor>,
    ) -> Result<WriteOutcome, CoordinateError> {
        let rf = rf.unwrap_or_else(|| self.topology.default_rf());
        let peers = self.topology.select(&rf)?.to_vec();
        let op = if payload.is_some() { "put" } else { "delete" };

        let mut batch: Vec<BoxFuture<'static, CommandReply>> = Vec::with_capacity(peers.len() + 1);
        for peer in peers {
            let command = match &payload {
                Some(body) => RemoteCommand::Put {
                    peer,
                    key: key.to_string(),
                    payload: body.clone(),
                },
                None => RemoteCommand::Delete {
                    peer,
                    key: key.to_string(),
                },
            };
            batch.push(Box::pin(command.execute(self.client.clone())));
        }

        // The local write is one more participant; its failure is a
        // missing ack, not a request-fatal fault.
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();
        let local_payload = payload.clone();
        batch.push(Box::pin(async move {
            let written = match &local_payload {
                Some(body) => store.put(&key_bytes, body),
                None => store.delete(&key_bytes),
            };
            match written {
                Ok(()) => CommandReply::Ack(true),
                Err(err) => {
                    tracing::warn!(error = %err, "local write failed");
                    CommandReply::Ack(false)
                }
            }
        }));

        let replies = self.dispatcher.process(batch).await;
        let acks = replies
            .iter()
            .filter(|reply| matches!(reply, CommandReply::Ack(true)))
            .count();

        if acks >= rf.ack() {
            Ok(WriteOutcome::Applied)
        } else {
            tracing::debug!(key = %key, acks, needed = rf.ack(), "write quorum not reached");
            replikv_metrics::metrics()
                .quorum_failures
                .with_label_values(&[op])
                .inc();
            Ok(WriteOutcome::Unreachable)
        }
    }
}

/// Reduce the records of all reachable participants into one outcome.
///
/// The winner is the highest-timestamp non-absent record; on a timestamp
/// tie a tombstone beats a live value, so a delete and a put in the same
/// millisecond resolve the same way on every node. `ackCount` is the
/// number of participants that answered at all — an `Absent` or
/// `Removed` answer is still an answer.
fn reduce_get(rf: &ReplicaFactor, records: Vec<VersionedRecord>) -> GetOutcome {
    if records.is_empty() {
        // Only possible while the pool is shutting down.
        return GetOutcome::Unreachable;
    }

    let ack_count = records.iter().filter(|r| !r.is_error()).count();
    let winner = records.iter().filter(|r| !r.is_absent()).max_by_key(|r| rank(r));

    match winner {
        None => GetOutcome::NotFound,
        Some(VersionedRecord::Removed { .. }) => GetOutcome::NotFound,
        Some(VersionedRecord::Exists { payload, .. }) => {
            if ack_count >= rf.ack() {
                GetOutcome::Found(payload.clone())
            } else {
                GetOutcome::Unreachable
            }
        }
        // Every reachable participant failed.
        Some(VersionedRecord::Error) => GetOutcome::Unreachable,
        Some(VersionedRecord::Absent) => unreachable!("absent records are filtered"),
    }
}

fn rank(record: &VersionedRecord) -> (i64, u8) {
    match record {
        VersionedRecord::Exists { timestamp_ms, .. } => (*timestamp_ms, 0),
        VersionedRecord::Removed { timestamp_ms } => (*timestamp_ms, 1),
        VersionedRecord::Error | VersionedRecord::Absent => (i64::MIN, 0),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
