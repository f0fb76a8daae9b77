//! replikv-storage: versioned record codec and the local store façade
//! over the embedded engine.

pub mod record;
pub mod store;

pub use record::{encode_value, now_ms, TruncatedRecord, VersionedRecord};
pub use store::{LocalStore, StoreError};
