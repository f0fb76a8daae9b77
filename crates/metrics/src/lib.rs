//! Metrics and tracing setup for replikv.
//!
//! Provides a global [`NodeMetrics`] singleton backed by the `prometheus`
//! crate, plus an optional lightweight HTTP server for Prometheus scraping.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

// ────────────────────────── Tracing ──────────────────────────

/// Initialize the tracing subscriber with env-filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

// ────────────────────────── Prometheus metrics ──────────────────────────

/// Global metrics instance.
static METRICS: OnceLock<NodeMetrics> = OnceLock::new();

/// Retrieve (or lazily create) the global metrics singleton.
pub fn metrics() -> &'static NodeMetrics {
    METRICS.get_or_init(NodeMetrics::new)
}

/// All Prometheus metrics for a replikv node.
pub struct NodeMetrics {
    pub registry: Registry,

    /// Client-facing requests, by operation.
    pub requests_total: IntCounterVec,
    /// Replica-to-replica requests served, by operation.
    pub internal_requests_total: IntCounterVec,
    /// Outbound replica calls issued, by operation.
    pub replica_calls_sent: IntCounterVec,
    /// Outbound replica calls that failed, by operation.
    pub replica_call_failures: IntCounterVec,
    /// Requests answered with a quorum failure, by operation.
    pub quorum_failures: IntCounterVec,
    /// Client-facing request latency, by operation.
    pub request_latency_secs: HistogramVec,
}

// Manual Debug impl because prometheus types don't derive Debug.
impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetrics").finish_non_exhaustive()
    }
}

/// Default histogram buckets (seconds) for request latency.
const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

impl NodeMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("replikv_requests_total", "Client-facing requests, by op"),
            &["op"],
        )
        .expect("requests_total counter vec");
        let internal_requests_total = IntCounterVec::new(
            Opts::new(
                "replikv_internal_requests_total",
                "Replica-to-replica requests served, by op",
            ),
            &["op"],
        )
        .expect("internal_requests_total counter vec");
        let replica_calls_sent = IntCounterVec::new(
            Opts::new(
                "replikv_replica_calls_sent_total",
                "Outbound replica calls issued, by op",
            ),
            &["op"],
        )
        .expect("replica_calls_sent counter vec");
        let replica_call_failures = IntCounterVec::new(
            Opts::new(
                "replikv_replica_call_failures_total",
                "Outbound replica calls that failed, by op",
            ),
            &["op"],
        )
        .expect("replica_call_failures counter vec");
        let quorum_failures = IntCounterVec::new(
            Opts::new(
                "replikv_quorum_failures_total",
                "Requests answered with a quorum failure, by op",
            ),
            &["op"],
        )
        .expect("quorum_failures counter vec");

        let request_latency_secs = HistogramVec::new(
            HistogramOpts::new(
                "replikv_request_latency_seconds",
                "Client-facing request latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["op"],
        )
        .expect("request_latency_secs histogram");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("register requests_total");
        registry
            .register(Box::new(internal_requests_total.clone()))
            .expect("register internal_requests_total");
        registry
            .register(Box::new(replica_calls_sent.clone()))
            .expect("register replica_calls_sent");
        registry
            .register(Box::new(replica_call_failures.clone()))
            .expect("register replica_call_failures");
        registry
            .register(Box::new(quorum_failures.clone()))
            .expect("register quorum_failures");
        registry
            .register(Box::new(request_latency_secs.clone()))
            .expect("register request_latency_secs");

        Self {
            registry,
            requests_total,
            internal_requests_total,
            replica_calls_sent,
            replica_call_failures,
            quorum_failures,
            request_latency_secs,
        }
    }
}

/// Encode all registered metrics in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let m = metrics();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&m.registry.gather(), &mut buf)
        .expect("prometheus text encoding");
    String::from_utf8(buf).expect("prometheus output is valid UTF-8")
}

/// Helper: start a request latency timer. Returns a guard that records
/// elapsed time on drop.
pub fn start_request_timer(op: &str) -> prometheus::HistogramTimer {
    metrics()
        .request_latency_secs
        .with_label_values(&[op])
        .start_timer()
}

// ────────────────────────── Metrics HTTP server ──────────────────────────

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

async fn metrics_handler(
    _req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let body = encode_metrics();
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .expect("valid HTTP response"))
}

/// Serve Prometheus metrics on the given address (`GET /metrics`).
///
/// This spawns a lightweight HTTP/1.1 server. Call from a `tokio::spawn`.
pub async fn serve_metrics(
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{}/metrics", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                tracing::debug!("metrics connection error: {}", e);
            }
        });
    }
}

// ────────────────────────── Tests ──────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init_and_increment() {
        let m = metrics();

        let before = m.requests_total.with_label_values(&["get"]).get();
        m.requests_total.with_label_values(&["get"]).inc();
        m.requests_total.with_label_values(&["get"]).inc();
        assert_eq!(m.requests_total.with_label_values(&["get"]).get(), before + 2);

        m.replica_calls_sent.with_label_values(&["put"]).inc();
        m.quorum_failures.with_label_values(&["delete"]).inc();
    }

    #[test]
    fn test_encode_metrics_format() {
        metrics().replica_call_failures.with_label_values(&["get"]).inc();

        let output = encode_metrics();
        assert!(output.contains("replikv_requests_total"));
        assert!(output.contains("replikv_replica_call_failures_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_latency_timer_records() {
        let m = metrics();
        drop(start_request_timer("get"));
        let h = m.request_latency_secs.with_label_values(&["get"]);
        assert!(h.get_sample_count() >= 1);
    }
}
