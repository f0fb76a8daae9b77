//! Replica factor: the ack/from quorum parameters of one request.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RfError {
    #[error("replica spec must be two '/'-separated integers")]
    Format,
    #[error("from must be at least 1")]
    ZeroFrom,
    #[error("ack must be between 1 and from")]
    AckOutOfRange,
}

/// Immutable `(ack, from)` pair: an operation contacts `from`
/// participants (the coordinator included) and succeeds once `ack` of
/// them answer positively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaFactor {
    ack: usize,
    from: usize,
}

impl ReplicaFactor {
    pub fn new(ack: usize, from: usize) -> Result<Self, RfError> {
        if from == 0 {
            return Err(RfError::ZeroFrom);
        }
        if ack == 0 || ack > from {
            return Err(RfError::AckOutOfRange);
        }
        Ok(Self { ack, from })
    }

    /// Majority-plus-one quorum over `nodes` participants. `nodes` must
    /// be at least 1 (a cluster always contains the local node).
    pub fn quorum(nodes: usize) -> Self {
        debug_assert!(nodes >= 1);
        Self {
            ack: nodes / 2 + 1,
            from: nodes,
        }
    }

    pub fn ack(&self) -> usize {
        self.ack
    }

    pub fn from(&self) -> usize {
        self.from
    }
}

impl FromStr for ReplicaFactor {
    type Err = RfError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut fields = spec.split('/');
        let ack = fields.next().ok_or(RfError::Format)?;
        let from = fields.next().ok_or(RfError::Format)?;
        if fields.next().is_some() {
            return Err(RfError::Format);
        }
        let ack: usize = ack.parse().map_err(|_| RfError::Format)?;
        let from: usize = from.parse().map_err(|_| RfError::Format)?;
        Self::new(ack, from)
    }
}

impl fmt::Display for ReplicaFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ack, self.from)
    }
}
