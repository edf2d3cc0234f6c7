//! Vbucket Storage
//!
//! An in-memory, ordered mutation history for a single vbucket. Active
//! vbuckets assign sequence numbers on write; replica vbuckets only accept
//! replicated mutations that carry the active copy's sequence numbers.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::mocktime::Chrono;
use crate::store::{Mutation, SeqNo, VbId};

/// Read side of a partition, used as a replication source
pub trait SourcePartition: Send + Sync {
    /// Highest sequence number committed so far
    fn max_seq_no(&self) -> SeqNo;

    /// All mutations with `after < seq_no <= up_to`, in ascending order
    fn get_all_within(&self, after: SeqNo, up_to: SeqNo) -> Result<Vec<Mutation>>;
}

/// Write side of a partition, used as a replication destination
pub trait DestinationPartition: Send + Sync {
    /// Append a replicated mutation. Must tolerate duplicates.
    fn append_replicated(&self, mutation: Mutation);
}

#[derive(Debug, Default)]
struct VbucketState {
    /// Every committed mutation, ascending by sequence number
    history: Vec<Mutation>,
    max_seq_no: SeqNo,
    last_cas: u64,
}

/// A single vbucket
#[derive(Debug)]
pub struct Vbucket {
    vb_id: VbId,
    chrono: Arc<Chrono>,
    state: RwLock<VbucketState>,
}

impl Vbucket {
    /// Create an empty vbucket
    pub fn new(chrono: Arc<Chrono>, vb_id: VbId) -> Self {
        Self {
            vb_id,
            chrono,
            state: RwLock::new(VbucketState::default()),
        }
    }

    /// Get the vbucket ID
    pub fn vb_id(&self) -> VbId {
        self.vb_id
    }

    /// Highest committed sequence number (0 when empty)
    pub fn max_seq_no(&self) -> SeqNo {
        self.state.read().max_seq_no
    }

    /// Number of mutations in the history
    pub fn len(&self) -> usize {
        self.state.read().history.len()
    }

    /// Check if the history is empty
    pub fn is_empty(&self) -> bool {
        self.state.read().history.is_empty()
    }

    /// Snapshot of the full history
    pub fn history(&self) -> Vec<Mutation> {
        self.state.read().history.clone()
    }

    /// Commit a new mutation at the current virtual time
    pub fn add_mutation(
        &self,
        key: &str,
        value: Vec<u8>,
        flags: u32,
        is_deleted: bool,
    ) -> Mutation {
        let now = self.chrono.now();
        let mut state = self.state.write();

        // CAS tracks virtual nanoseconds but must stay strictly increasing
        // for writes landing at the same instant.
        let time_cas = now.timestamp_nanos_opt().unwrap_or(i64::MAX) as u64;
        let cas = time_cas.max(state.last_cas + 1);

        let mutation = Mutation {
            vb_id: self.vb_id,
            seq_no: state.max_seq_no + 1,
            key: key.to_string(),
            value,
            flags,
            cas,
            is_deleted,
            modified_time: now,
        };

        state.max_seq_no = mutation.seq_no;
        state.last_cas = cas;
        state.history.push(mutation.clone());

        tracing::trace!(vb_id = self.vb_id, seq_no = mutation.seq_no, key, "Mutation committed");
        mutation
    }

    /// Append a mutation replicated from another vbucket.
    ///
    /// Returns false when the mutation is already covered by this history.
    pub fn add_rep_mutation(&self, mutation: Mutation) -> bool {
        let mut state = self.state.write();
        if mutation.seq_no <= state.max_seq_no {
            tracing::debug!(
                vb_id = self.vb_id,
                seq_no = mutation.seq_no,
                max_seq_no = state.max_seq_no,
                "Ignoring already-applied replicated mutation"
            );
            return false;
        }

        state.max_seq_no = mutation.seq_no;
        state.last_cas = state.last_cas.max(mutation.cas);
        state.history.push(mutation);
        true
    }

    /// Latest live version of a document
    pub fn get(&self, key: &str) -> Option<Mutation> {
        let state = self.state.read();
        state
            .history
            .iter()
            .rev()
            .find(|m| m.key == key)
            .filter(|m| !m.is_deleted)
            .cloned()
    }

    /// All mutations with `after < seq_no <= up_to`
    pub fn get_all_within(&self, after: SeqNo, up_to: SeqNo) -> Result<Vec<Mutation>> {
        if after > up_to {
            return Err(Error::SeqNoOutOfRange { after, up_to });
        }

        let state = self.state.read();
        // History is sorted, so the window is a contiguous slice.
        let start = state.history.partition_point(|m| m.seq_no <= after);
        let end = state.history.partition_point(|m| m.seq_no <= up_to);
        Ok(state.history[start..end].to_vec())
    }
}

impl SourcePartition for Vbucket {
    fn max_seq_no(&self) -> SeqNo {
        Vbucket::max_seq_no(self)
    }

    fn get_all_within(&self, after: SeqNo, up_to: SeqNo) -> Result<Vec<Mutation>> {
        Vbucket::get_all_within(self, after, up_to)
    }
}

impl DestinationPartition for Vbucket {
    fn append_replicated(&self, mutation: Mutation) {
        self.add_rep_mutation(mutation);
    }
}
