//! HTTP networking layer for replikv.
//!
//! Provides:
//! - `HttpReplicaClient`: implements `ReplicaClient` over reqwest
//! - `build_router` / `AppState`: the axum service for one node

pub mod client;
pub mod server;

pub use client::HttpReplicaClient;
pub use server::{build_router, AppState};
