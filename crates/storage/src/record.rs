//! Versioned record codec.
//!
//! Every value stored for a logical key carries a one-byte existence flag
//! and a big-endian millisecond timestamp in front of the payload:
//!
//! ```text
//! +--------+-------------------+------------------+
//! | flag:1 | timestamp_ms:8 BE | payload: rest    |
//! +--------+-------------------+------------------+
//! ```
//!
//! Flag `1` marks a live value, `0` a tombstone (empty payload). A key
//! with no stored bytes at all is absent. The same encoding doubles as
//! the wire form of a record in replica-to-replica GET responses, where
//! an empty body stands for an absent key.

use std::time::{SystemTime, UNIX_EPOCH};

/// Flag byte for a live value.
pub const FLAG_LIVE: u8 = 1;

/// Flag byte for a tombstone.
pub const FLAG_TOMBSTONE: u8 = 0;

/// Fixed header length: flag byte plus timestamp.
pub const HEADER_LEN: usize = 1 + 8;

/// Stored bytes that are non-empty but shorter than the fixed header.
/// Always data corruption, never a legal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stored record shorter than {HEADER_LEN}-byte header: {len} bytes")]
pub struct TruncatedRecord {
    pub len: usize,
}

/// The logical state of a key as one participant sees it.
///
/// Variants carry only the fields their state permits: a record can never
/// be live without a payload, and a tombstone or absent key can never
/// carry one. `Error` is a coordinator-side reduction value standing for
/// an unreachable participant; it is never persisted or serialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedRecord {
    Exists { payload: Vec<u8>, timestamp_ms: i64 },
    Removed { timestamp_ms: i64 },
    Absent,
    Error,
}

impl VersionedRecord {
    /// Write timestamp, if this state carries one.
    pub fn timestamp_ms(&self) -> Option<i64> {
        match self {
            Self::Exists { timestamp_ms, .. } | Self::Removed { timestamp_ms } => {
                Some(*timestamp_ms)
            }
            Self::Absent | Self::Error => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Decode a record from stored or wire bytes. No bytes at all means
    /// the key is absent.
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self, TruncatedRecord> {
        if bytes.is_empty() {
            return Ok(Self::Absent);
        }
        if bytes.len() < HEADER_LEN {
            return Err(TruncatedRecord { len: bytes.len() });
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[1..HEADER_LEN]);
        let timestamp_ms = i64::from_be_bytes(ts);
        if bytes[0] == FLAG_TOMBSTONE {
            Ok(Self::Removed { timestamp_ms })
        } else {
            Ok(Self::Exists {
                payload: bytes[HEADER_LEN..].to_vec(),
                timestamp_ms,
            })
        }
    }

    /// Encode this record for an internal GET response body.
    ///
    /// `Absent` has no stored form, so it encodes to an empty body.
    /// `Error` never crosses the wire; it encodes to nothing as well.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        match self {
            Self::Exists {
                payload,
                timestamp_ms,
            } => encode_value(payload, true, *timestamp_ms),
            Self::Removed { timestamp_ms } => encode_value(&[], false, *timestamp_ms),
            Self::Absent | Self::Error => Vec::new(),
        }
    }
}

/// Build the stored byte form of a record.
pub fn encode_value(payload: &[u8], live: bool, timestamp_ms: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(if live { FLAG_LIVE } else { FLAG_TOMBSTONE });
    buf.extend_from_slice(&timestamp_ms.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Current wall clock in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_roundtrip() {
        let bytes = encode_value(b"hello", true, 42);
        let record = VersionedRecord::from_wire_bytes(&bytes).unwrap();
        assert_eq!(
            record,
            VersionedRecord::Exists {
                payload: b"hello".to_vec(),
                timestamp_ms: 42,
            }
        );
    }

    #[test]
    fn test_tombstone_roundtrip() {
        let bytes = encode_value(&[], false, 1_700_000_000_123);
        let record = VersionedRecord::from_wire_bytes(&bytes).unwrap();
        assert_eq!(
            record,
            VersionedRecord::Removed {
                timestamp_ms: 1_700_000_000_123,
            }
        );
    }

    #[test]
    fn test_empty_is_absent() {
        assert_eq!(
            VersionedRecord::from_wire_bytes(&[]).unwrap(),
            VersionedRecord::Absent
        );
        assert!(VersionedRecord::Absent.to_wire_bytes().is_empty());
    }

    #[test]
    fn test_short_record_is_corrupt() {
        for len in 1..HEADER_LEN {
            let err = VersionedRecord::from_wire_bytes(&vec![1u8; len]).unwrap_err();
            assert_eq!(err, TruncatedRecord { len });
        }
    }

    #[test]
    fn test_layout_is_flag_then_be_timestamp() {
        let bytes = encode_value(b"x", true, 0x0102_0304_0506_0708);
        assert_eq!(
            bytes,
            vec![1, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, b'x']
        );
    }

    #[test]
    fn test_empty_payload_still_live() {
        let bytes = encode_value(&[], true, 7);
        let record = VersionedRecord::from_wire_bytes(&bytes).unwrap();
        assert_eq!(
            record,
            VersionedRecord::Exists {
                payload: Vec::new(),
                timestamp_ms: 7,
            }
        );
    }

    #[test]
    fn test_record_wire_roundtrip() {
        let record = VersionedRecord::Exists {
            payload: b"payload".to_vec(),
            timestamp_ms: now_ms(),
        };
        let decoded = VersionedRecord::from_wire_bytes(&record.to_wire_bytes()).unwrap();
        assert_eq!(decoded, record);
    }
}
