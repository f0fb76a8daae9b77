//! HTTP service: the client-facing and replica-to-replica surface.
//!
//! Routes:
//! - `GET /v0/status` — liveness probe.
//! - `GET|PUT|DELETE /v0/entity?id=<key>[&replicas=<ack>/<from>]` —
//!   the KV surface. Requests carrying the internal marker header are
//!   replica traffic and touch only the local store; everything else
//!   goes through the coordinator. Unknown paths and unsupported
//!   methods are client errors.
//!
//! Internal GET answers with the codec-serialised record (the
//! coordinator needs the timestamp to reduce), external GET with the
//! raw payload bytes.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use replikv_replication::{
    CoordinateError, Coordinator, GetOutcome, ReplicaClient, ReplicaFactor, WriteOutcome,
    INTERNAL_MARKER_HEADER,
};
use replikv_storage::{LocalStore, VersionedRecord};
use serde::Deserialize;
use std::sync::Arc;

/// Process-scoped context handed to every handler.
pub struct AppState<C: ReplicaClient> {
    pub coordinator: Coordinator<C>,
    pub store: Arc<LocalStore>,
}

impl<C: ReplicaClient> std::fmt::Debug for AppState<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

/// Assemble the axum router for one node.
pub fn build_router<C: ReplicaClient>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route("/v0/status", get(status).fallback(bad_request))
        .route(
            "/v0/entity",
            get(get_entity::<C>)
                .put(put_entity::<C>)
                .delete(delete_entity::<C>)
                .fallback(bad_request),
        )
        .fallback(bad_request)
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct EntityParams {
    id: Option<String>,
    replicas: Option<String>,
}

impl EntityParams {
    /// Extract the key and the optional quorum override, rejecting
    /// missing/empty ids and malformed replica specs.
    fn parse(self) -> Result<(String, Option<ReplicaFactor>), StatusCode> {
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(StatusCode::BAD_REQUEST),
        };
        let rf = match self.replicas {
            Some(spec) => Some(spec.parse().map_err(|_| StatusCode::BAD_REQUEST)?),
            None => None,
        };
        Ok((id, rf))
    }
}

async fn status() -> StatusCode {
    StatusCode::OK
}

async fn bad_request() -> StatusCode {
    StatusCode::BAD_REQUEST
}

fn is_internal(headers: &HeaderMap) -> bool {
    headers.contains_key(INTERNAL_MARKER_HEADER)
}

/// A coordinator error either means the request asked for an impossible
/// replica subset (client error) or the local store failed (server
/// fault). Nothing else reaches this point: replica failures were
/// already reduced to values.
fn coordinate_error(err: CoordinateError) -> Response {
    match err {
        CoordinateError::Selection(err) => {
            tracing::debug!(error = %err, "unsatisfiable replica spec");
            StatusCode::BAD_REQUEST.into_response()
        }
        CoordinateError::Storage(err) => {
            tracing::error!(error = %err, "local storage failure");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// GET
// ---------------------------------------------------------------------------

async fn get_entity<C: ReplicaClient>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Query(params): Query<EntityParams>,
) -> Response {
    let (id, rf) = match params.parse() {
        Ok(parsed) => parsed,
        Err(status) => return status.into_response(),
    };

    if is_internal(&headers) {
        replikv_metrics::metrics()
            .internal_requests_total
            .with_label_values(&["get"])
            .inc();
        return internal_get(&state.store, &id);
    }

    replikv_metrics::metrics()
        .requests_total
        .with_label_values(&["get"])
        .inc();
    let _timer = replikv_metrics::start_request_timer("get");

    match state.coordinator.get(&id, rf).await {
        Ok(GetOutcome::Found(payload)) => (StatusCode::OK, payload).into_response(),
        Ok(GetOutcome::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Ok(GetOutcome::Unreachable) => StatusCode::GATEWAY_TIMEOUT.into_response(),
        Err(err) => coordinate_error(err),
    }
}

/// Local-only read for replica traffic: the record travels in its
/// serialised form so the caller sees the timestamp, and a tombstone is
/// still a 404 — just one that carries its own evidence.
fn internal_get(store: &LocalStore, id: &str) -> Response {
    match store.get(id.as_bytes()) {
        Ok(record @ VersionedRecord::Exists { .. }) => {
            (StatusCode::OK, record.to_wire_bytes()).into_response()
        }
        Ok(record) => (StatusCode::NOT_FOUND, record.to_wire_bytes()).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "internal get failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// PUT
// ---------------------------------------------------------------------------

async fn put_entity<C: ReplicaClient>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Query(params): Query<EntityParams>,
    body: Bytes,
) -> Response {
    let (id, rf) = match params.parse() {
        Ok(parsed) => parsed,
        Err(status) => return status.into_response(),
    };

    if is_internal(&headers) {
        replikv_metrics::metrics()
            .internal_requests_total
            .with_label_values(&["put"])
            .inc();
        return match state.store.put(id.as_bytes(), &body) {
            Ok(()) => StatusCode::CREATED.into_response(),
            Err(err) => {
                tracing::error!(error = %err, "internal put failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
    }

    replikv_metrics::metrics()
        .requests_total
        .with_label_values(&["put"])
        .inc();
    let _timer = replikv_metrics::start_request_timer("put");

    match state.coordinator.put(&id, body.to_vec(), rf).await {
        Ok(WriteOutcome::Applied) => StatusCode::CREATED.into_response(),
        Ok(WriteOutcome::Unreachable) => StatusCode::GATEWAY_TIMEOUT.into_response(),
        Err(err) => coordinate_error(err),
    }
}

// ---------------------------------------------------------------------------
// DELETE
// ---------------------------------------------------------------------------

async fn delete_entity<C: ReplicaClient>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Query(params): Query<EntityParams>,
) -> Response {
    let (id, rf) = match params.parse() {
        Ok(parsed) => parsed,
        Err(status) => return status.into_response(),
    };

    if is_internal(&headers) {
        replikv_metrics::metrics()
            .internal_requests_total
            .with_label_values(&["delete"])
            .inc();
        return match state.store.delete(id.as_bytes()) {
            Ok(()) => StatusCode::ACCEPTED.into_response(),
            Err(err) => {
                tracing::error!(error = %err, "internal delete failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
    }

    replikv_metrics::metrics()
        .requests_total
        .with_label_values(&["delete"])
        .inc();
    let _timer = replikv_metrics::start_request_timer("delete");

    match state.coordinator.delete(&id, rf).await {
        Ok(WriteOutcome::Applied) => StatusCode::ACCEPTED.into_response(),
        Ok(WriteOutcome::Unreachable) => StatusCode::GATEWAY_TIMEOUT.into_response(),
        Err(err) => coordinate_error(err),
    }
}
