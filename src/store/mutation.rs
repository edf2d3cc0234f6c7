//! Mutation Records
//!
//! A mutation is one committed version of a document inside a vbucket's
//! history. Replication forwards these records unmodified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-vbucket sequence number, assigned at commit time
pub type SeqNo = u64;

/// Vbucket identifier
pub type VbId = u16;

/// A committed document mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// Vbucket the mutation was committed to
    pub vb_id: VbId,
    /// Sequence number within the vbucket
    pub seq_no: SeqNo,
    /// Document key
    pub key: String,
    /// Document body
    pub value: Vec<u8>,
    /// Client-supplied flags
    pub flags: u32,
    /// Compare-and-swap token
    pub cas: u64,
    /// Whether this mutation is a deletion tombstone
    pub is_deleted: bool,
    /// Virtual time at which the mutation was committed
    pub modified_time: DateTime<Utc>,
}

impl Mutation {
    /// Earliest virtual time at which this mutation may be replicated
    pub fn eligible_at(&self, latency: std::time::Duration) -> DateTime<Utc> {
        crate::mocktime::saturating_add(self.modified_time, latency)
    }

    /// Check if this mutation is a tombstone
    pub fn is_tombstone(&self) -> bool {
        self.is_deleted
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vb:{} seq:{} key:{}{}",
            self.vb_id,
            self.seq_no,
            self.key,
            if self.is_deleted { " (deleted)" } else { "" }
        )
    }
}
