//! HTTP client implementing [`ReplicaClient`].
//!
//! One pooled `reqwest` client per process; connections to peers are
//! reused across requests. Every call carries the internal marker
//! header so the receiving node applies local-only semantics, and every
//! call is bounded by the configured per-request timeout — a hung peer
//! becomes a timeout error, which the command layer reduces to a
//! negative reply.

use replikv_replication::{ReplicaClient, ReplicaError, INTERNAL_MARKER_HEADER};
use replikv_storage::VersionedRecord;
use std::time::Duration;

#[derive(Debug)]
pub struct HttpReplicaClient {
    http: reqwest::Client,
}

impl HttpReplicaClient {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { http })
    }

    fn entity_url(peer: &str) -> String {
        format!("{}/v0/entity", peer)
    }

    async fn fetch_record(&self, peer: &str, key: &str) -> Result<VersionedRecord, ReplicaError> {
        let response = self
            .http
            .get(Self::entity_url(peer))
            .query(&[("id", key)])
            .header(INTERNAL_MARKER_HEADER, "true")
            .send()
            .await
            .map_err(transport)?;

        match response.status().as_u16() {
            // 200 carries a live record, 404 a tombstone or nothing.
            200 | 404 => {
                let body = response.bytes().await.map_err(transport)?;
                Ok(VersionedRecord::from_wire_bytes(&body)?)
            }
            status => Err(ReplicaError::UnexpectedStatus(status)),
        }
    }

    async fn send_write(
        &self,
        peer: &str,
        key: &str,
        payload: Option<&[u8]>,
        expected_status: u16,
    ) -> Result<bool, ReplicaError> {
        let url = Self::entity_url(peer);
        let request = match payload {
            Some(body) => self.http.put(url).body(body.to_vec()),
            None => self.http.delete(url),
        };
        let response = request
            .query(&[("id", key)])
            .header(INTERNAL_MARKER_HEADER, "true")
            .send()
            .await
            .map_err(transport)?;
        Ok(response.status().as_u16() == expected_status)
    }
}

fn transport(err: reqwest::Error) -> ReplicaError {
    ReplicaError::Transport(err.to_string())
}

#[async_trait::async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn replica_get(&self, peer: &str, key: &str) -> Result<VersionedRecord, ReplicaError> {
        let m = replikv_metrics::metrics();
        m.replica_calls_sent.with_label_values(&["get"]).inc();
        let result = self.fetch_record(peer, key).await;
        if result.is_err() {
            m.replica_call_failures.with_label_values(&["get"]).inc();
        }
        result
    }

    async fn replica_put(
        &self,
        peer: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<bool, ReplicaError> {
        let m = replikv_metrics::metrics();
        m.replica_calls_sent.with_label_values(&["put"]).inc();
        let result = self.send_write(peer, key, Some(payload), 201).await;
        if result.is_err() {
            m.replica_call_failures.with_label_values(&["put"]).inc();
        }
        result
    }

    async fn replica_delete(&self, peer: &str, key: &str) -> Result<bool, ReplicaError> {
        let m = replikv_metrics::metrics();
        m.replica_calls_sent.with_label_values(&["delete"]).inc();
        let result = self.send_write(peer, key, None, 202).await;
        if result.is_err() {
            m.replica_call_failures.with_label_values(&["delete"]).inc();
        }
        result
    }
}
