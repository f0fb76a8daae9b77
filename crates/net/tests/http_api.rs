//! Integration tests: spin up real nodes over HTTP, then exercise the
//! client-facing surface — single-node flows, cross-node replication,
//! quorum failures with a dead peer, and the internal replica path.

use replikv_net::{build_router, AppState, HttpReplicaClient};
use replikv_replication::{Coordinator, Dispatcher, Topology};
use replikv_storage::{LocalStore, VersionedRecord};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestNode {
    addr: SocketAddr,
    _dir: TempDir,
}

impl TestNode {
    fn url(&self) -> String {
        format!("http://{}/v0/entity", self.addr)
    }

    fn status_url(&self) -> String {
        format!("http://{}/v0/status", self.addr)
    }
}

async fn bind() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").await.unwrap()
}

fn base_url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

async fn spawn_node(listener: TcpListener, cluster: Vec<String>) -> TestNode {
    let addr = listener.local_addr().unwrap();
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LocalStore::open(dir.path()).unwrap());
    let topology = Topology::from_cluster(&cluster, addr.port()).unwrap();
    let client = Arc::new(HttpReplicaClient::new(Duration::from_millis(500)).unwrap());
    let coordinator = Coordinator::new(
        store.clone(),
        topology,
        client,
        Arc::new(Dispatcher::new(16)),
    );
    let app = build_router(Arc::new(AppState { coordinator, store }));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestNode { addr, _dir: dir }
}

/// A cluster of `n` live nodes, each knowing the full topology.
async fn spawn_cluster(n: usize) -> Vec<TestNode> {
    let mut listeners = Vec::with_capacity(n);
    for _ in 0..n {
        listeners.push(bind().await);
    }
    let cluster: Vec<String> = listeners
        .iter()
        .map(|l| base_url(l.local_addr().unwrap()))
        .collect();

    let mut nodes = Vec::with_capacity(n);
    for listener in listeners {
        nodes.push(spawn_node(listener, cluster.clone()).await);
    }
    nodes
}

// ---------------------------------------------------------------------------
// Status and input validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_status_endpoint() {
    let nodes = spawn_cluster(1).await;
    let http = reqwest::Client::new();

    let resp = http.get(nodes[0].status_url()).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.bytes().await.unwrap().is_empty());

    let resp = http.put(nodes[0].status_url()).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn test_client_errors() {
    let nodes = spawn_cluster(1).await;
    let http = reqwest::Client::new();

    // Missing and empty id.
    let resp = http.get(nodes[0].url()).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let resp = http
        .get(nodes[0].url())
        .query(&[("id", "")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // Malformed replica specs.
    for spec in ["x/y", "3/2", "1/0", "1/2/3"] {
        let resp = http
            .get(nodes[0].url())
            .query(&[("id", "k"), ("replicas", spec)])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400, "spec {} must be rejected", spec);
    }

    // Valid spec, but the cluster cannot supply 3 participants.
    let resp = http
        .get(nodes[0].url())
        .query(&[("id", "k"), ("replicas", "1/3")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // Unknown path.
    let resp = http
        .get(format!("http://{}/v1/entity", nodes[0].addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

// ---------------------------------------------------------------------------
// Single node
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_node_roundtrip() {
    let nodes = spawn_cluster(1).await;
    let http = reqwest::Client::new();
    let node = &nodes[0];

    let resp = http
        .get(node.url())
        .query(&[("id", "k")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = http
        .put(node.url())
        .query(&[("id", "k")])
        .body("payload-bytes")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let resp = http
        .get(node.url())
        .query(&[("id", "k")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"payload-bytes");

    let resp = http
        .delete(node.url())
        .query(&[("id", "k")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);

    let resp = http
        .get(node.url())
        .query(&[("id", "k")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

// ---------------------------------------------------------------------------
// Replication across nodes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_three_node_replication() {
    let nodes = spawn_cluster(3).await;
    let http = reqwest::Client::new();

    // Write through node 0 with the default majority quorum.
    let resp = http
        .put(nodes[0].url())
        .query(&[("id", "shared")])
        .body("v1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // Read from another coordinator.
    let resp = http
        .get(nodes[1].url())
        .query(&[("id", "shared")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"v1");

    // Delete through a third coordinator; the tombstone wins everywhere.
    let resp = http
        .delete(nodes[2].url())
        .query(&[("id", "shared")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);

    let resp = http
        .get(nodes[0].url())
        .query(&[("id", "shared")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn test_local_only_write_visible_through_quorum_read() {
    let nodes = spawn_cluster(3).await;
    let http = reqwest::Client::new();

    // replicas=1/1 writes to the coordinator only.
    let resp = http
        .put(nodes[0].url())
        .query(&[("id", "solo"), ("replicas", "1/1")])
        .body("here")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // Another node's local-only read misses it...
    let resp = http
        .get(nodes[1].url())
        .query(&[("id", "solo"), ("replicas", "1/1")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    // ...but a full-cluster read finds the single copy.
    let resp = http
        .get(nodes[1].url())
        .query(&[("id", "solo"), ("replicas", "1/3")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"here");
}

#[tokio::test]
async fn test_quorum_with_dead_peer() {
    // Two live nodes plus one topology entry nobody listens on.
    let listener_a = bind().await;
    let listener_b = bind().await;
    let dead = bind().await;
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let cluster = vec![
        base_url(listener_a.local_addr().unwrap()),
        base_url(listener_b.local_addr().unwrap()),
        base_url(dead_addr),
    ];
    let node_a = spawn_node(listener_a, cluster.clone()).await;
    let _node_b = spawn_node(listener_b, cluster.clone()).await;
    let http = reqwest::Client::new();

    // All three required: the dead peer breaks the quorum.
    let resp = http
        .put(node_a.url())
        .query(&[("id", "k"), ("replicas", "3/3")])
        .body("v")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 504);

    // A majority is enough: local + the live peer.
    let resp = http
        .put(node_a.url())
        .query(&[("id", "k"), ("replicas", "2/3")])
        .body("v")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let resp = http
        .get(node_a.url())
        .query(&[("id", "k"), ("replicas", "2/3")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"v");

    let resp = http
        .get(node_a.url())
        .query(&[("id", "k"), ("replicas", "3/3")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 504);

    let resp = http
        .delete(node_a.url())
        .query(&[("id", "k"), ("replicas", "3/3")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 504);
}

// ---------------------------------------------------------------------------
// Internal replica path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_internal_get_returns_serialized_record() {
    let nodes = spawn_cluster(1).await;
    let http = reqwest::Client::new();
    let node = &nodes[0];

    // Absent key: 404 with an empty body.
    let resp = http
        .get(node.url())
        .query(&[("id", "k")])
        .header("x-replikv-internal", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let body = resp.bytes().await.unwrap();
    assert_eq!(
        VersionedRecord::from_wire_bytes(&body).unwrap(),
        VersionedRecord::Absent
    );

    // Live key: 200 with flag + timestamp + payload.
    let resp = http
        .put(node.url())
        .query(&[("id", "k")])
        .body("v")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let resp = http
        .get(node.url())
        .query(&[("id", "k")])
        .header("x-replikv-internal", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body = resp.bytes().await.unwrap();
    match VersionedRecord::from_wire_bytes(&body).unwrap() {
        VersionedRecord::Exists {
            payload,
            timestamp_ms,
        } => {
            assert_eq!(payload, b"v");
            assert!(timestamp_ms > 0);
        }
        other => panic!("expected live record, got {:?}", other),
    }

    // Tombstoned key: 404, but the record carries the delete timestamp.
    let resp = http
        .delete(node.url())
        .query(&[("id", "k")])
        .header("x-replikv-internal", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);

    let resp = http
        .get(node.url())
        .query(&[("id", "k")])
        .header("x-replikv-internal", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let body = resp.bytes().await.unwrap();
    assert!(matches!(
        VersionedRecord::from_wire_bytes(&body).unwrap(),
        VersionedRecord::Removed { .. }
    ));
}

// ---------------------------------------------------------------------------
// Internal requests must not fan out
// ---------------------------------------------------------------------------

mod no_recursive_fan_out {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use replikv_replication::{ReplicaClient, ReplicaError, INTERNAL_MARKER_HEADER};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Counts every outbound replica call; all of them fail.
    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ReplicaClient for CountingClient {
        async fn replica_get(
            &self,
            _peer: &str,
            _key: &str,
        ) -> Result<VersionedRecord, ReplicaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ReplicaError::Transport("unused".into()))
        }

        async fn replica_put(
            &self,
            _peer: &str,
            _key: &str,
            _payload: &[u8],
        ) -> Result<bool, ReplicaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ReplicaError::Transport("unused".into()))
        }

        async fn replica_delete(&self, _peer: &str, _key: &str) -> Result<bool, ReplicaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ReplicaError::Transport("unused".into()))
        }
    }

    #[tokio::test]
    async fn test_internal_requests_issue_zero_remote_commands() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(dir.path()).unwrap());
        // A three-node topology: any external request would fan out.
        let topology = Topology::from_cluster(
            &[
                "http://local:1".to_string(),
                "http://peer-a:2".to_string(),
                "http://peer-b:3".to_string(),
            ],
            1,
        )
        .unwrap();
        let client = Arc::new(CountingClient::default());
        let coordinator = Coordinator::new(
            store.clone(),
            topology,
            client.clone(),
            Arc::new(Dispatcher::new(4)),
        );
        let router = build_router(Arc::new(AppState { coordinator, store }));

        let put = Request::builder()
            .method("PUT")
            .uri("/v0/entity?id=k")
            .header(INTERNAL_MARKER_HEADER, "true")
            .body(Body::from("v"))
            .unwrap();
        let response = router.clone().oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let get = Request::builder()
            .method("GET")
            .uri("/v0/entity?id=k")
            .header(INTERNAL_MARKER_HEADER, "true")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let delete = Request::builder()
            .method("DELETE")
            .uri("/v0/entity?id=k")
            .header(INTERNAL_MARKER_HEADER, "true")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        assert_eq!(
            client.calls.load(Ordering::SeqCst),
            0,
            "internal requests must never fan out"
        );
    }

    #[tokio::test]
    async fn test_external_request_does_fan_out() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::open(dir.path()).unwrap());
        let topology = Topology::from_cluster(
            &[
                "http://local:1".to_string(),
                "http://peer-a:2".to_string(),
                "http://peer-b:3".to_string(),
            ],
            1,
        )
        .unwrap();
        let client = Arc::new(CountingClient::default());
        let coordinator = Coordinator::new(
            store.clone(),
            topology,
            client.clone(),
            Arc::new(Dispatcher::new(4)),
        );
        let router = build_router(Arc::new(AppState { coordinator, store }));

        let put = Request::builder()
            .method("PUT")
            .uri("/v0/entity?id=k")
            .body(Body::from("v"))
            .unwrap();
        // Both peers fail, so the default 2/3 quorum is missed.
        let response = router.oneshot(put).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
