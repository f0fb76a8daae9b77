//! replikv-replication: the replication coordination protocol.
//!
//! Provides:
//! - [`ReplicaFactor`]: ack/from quorum parameters and their validation
//! - [`Topology`]: the deterministic peer list a coordinator fans out to
//! - [`RemoteCommand`] / [`ReplicaClient`]: one KV operation against one
//!   peer over an abstract transport, failures reduced to values
//! - [`Dispatcher`]: shared bounded-concurrency batch execution with
//!   graceful shutdown
//! - [`Coordinator`]: per-request fan-out, last-write-wins reduction and
//!   quorum accounting

pub mod command;
pub mod coordinator;
pub mod dispatcher;
pub mod rf;
pub mod topology;

pub use command::{
    CommandReply, RemoteCommand, ReplicaClient, ReplicaError, INTERNAL_MARKER_HEADER,
};
pub use coordinator::{CoordinateError, Coordinator, GetOutcome, WriteOutcome};
pub use dispatcher::Dispatcher;
pub use rf::{ReplicaFactor, RfError};
pub use topology::{Topology, TopologyError};
