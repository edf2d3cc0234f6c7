//! Bucket
//!
//! A bucket owns one active copy and `num_replicas` replica copies of its
//! vbuckets. Writes always land on the active copy; each replica copy is
//! fed by its own replicator running at the bucket's replication latency.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::BucketConfig;
use crate::error::{Error, Result};
use crate::mocktime::Chrono;
use crate::store::{
    DestinationPartition, Mutation, Replicator, ReplicatorConfig, SeqNo, SourcePartition,
    VbId, Vbucket,
};

/// Replication progress of one replica copy
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaStatus {
    /// Replica index (1-based; 0 is the active copy)
    pub replica: usize,
    /// Whether replication into this copy is paused
    pub paused: bool,
    /// Mutations already applied to this copy
    pub replicated_mutations: u64,
    /// Sequence numbers committed on the active copy but not yet replicated
    pub pending_seq_nos: u64,
    /// Source fetches that were skipped
    pub fetch_anomalies: u64,
    /// Next scheduled replication wake-up
    pub next_wake: Option<DateTime<Utc>>,
}

/// A bucket with active and replica vbuckets
pub struct Bucket {
    name: String,
    num_vbuckets: u16,
    /// `vbuckets[0]` is the active copy, `vbuckets[r]` replica `r`
    vbuckets: Vec<Vec<Arc<Vbucket>>>,
    /// `replicators[r - 1]` feeds replica `r`
    replicators: Vec<Replicator>,
}

impl Bucket {
    /// Create a bucket and its replicators
    pub fn new(chrono: Arc<Chrono>, config: &BucketConfig) -> Result<Self> {
        config.validate()?;

        let vbuckets: Vec<Vec<Arc<Vbucket>>> = (0..=config.num_replicas)
            .map(|_| {
                (0..config.num_vbuckets)
                    .map(|vb_id| Arc::new(Vbucket::new(chrono.clone(), vb_id)))
                    .collect()
            })
            .collect();

        let mut replicators = Vec::with_capacity(config.num_replicas);
        for replica in 1..=config.num_replicas {
            replicators.push(Replicator::new(ReplicatorConfig {
                chrono: chrono.clone(),
                src_vbuckets: vbuckets[0]
                    .iter()
                    .map(|vb| vb.clone() as Arc<dyn SourcePartition>)
                    .collect(),
                dst_vbuckets: vbuckets[replica]
                    .iter()
                    .map(|vb| vb.clone() as Arc<dyn DestinationPartition>)
                    .collect(),
                latency: config.replication_latency(),
            })?);
        }

        tracing::info!(
            bucket = %config.name,
            num_vbuckets = config.num_vbuckets,
            num_replicas = config.num_replicas,
            latency_ms = config.replication_latency_ms,
            "Bucket created"
        );

        Ok(Self {
            name: config.name.clone(),
            num_vbuckets: config.num_vbuckets,
            vbuckets,
            replicators,
        })
    }

    /// Get the bucket name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of vbuckets per copy
    pub fn num_vbuckets(&self) -> u16 {
        self.num_vbuckets
    }

    /// Number of replica copies
    pub fn num_replicas(&self) -> usize {
        self.replicators.len()
    }

    /// Map a key to its vbucket
    pub fn vb_id_for_key(&self, key: &str) -> VbId {
        let hash = (crc32fast::hash(key.as_bytes()) >> 16) & 0x7fff;
        (hash % u32::from(self.num_vbuckets)) as VbId
    }

    /// Get a vbucket from the active copy (`replica_idx == 0`) or a replica
    pub fn vbucket(&self, replica_idx: usize, vb_id: VbId) -> Result<Arc<Vbucket>> {
        let copy = self
            .vbuckets
            .get(replica_idx)
            .ok_or(Error::ReplicaNotFound(replica_idx))?;
        copy.get(usize::from(vb_id))
            .cloned()
            .ok_or(Error::VbucketNotFound(vb_id))
    }

    /// Get the replicator feeding replica `replica_idx` (1-based)
    pub fn replicator(&self, replica_idx: usize) -> Option<&Replicator> {
        replica_idx
            .checked_sub(1)
            .and_then(|idx| self.replicators.get(idx))
    }

    /// Store a document on the active copy
    pub fn upsert(&self, key: &str, value: Vec<u8>, flags: u32) -> Result<Mutation> {
        let vb_id = self.vb_id_for_key(key);
        let mutation = self.vbucket(0, vb_id)?.add_mutation(key, value, flags, false);
        self.signal_replicators(vb_id);
        Ok(mutation)
    }

    /// Delete a document from the active copy, leaving a tombstone
    pub fn remove(&self, key: &str) -> Result<Mutation> {
        let vb_id = self.vb_id_for_key(key);
        let vbucket = self.vbucket(0, vb_id)?;
        if vbucket.get(key).is_none() {
            return Err(Error::DocumentNotFound(key.to_string()));
        }

        let mutation = vbucket.add_mutation(key, Vec::new(), 0, true);
        self.signal_replicators(vb_id);
        Ok(mutation)
    }

    /// Read a document from the active copy or a replica
    pub fn get(&self, replica_idx: usize, key: &str) -> Result<Option<Mutation>> {
        let vb_id = self.vb_id_for_key(key);
        Ok(self.vbucket(replica_idx, vb_id)?.get(key))
    }

    /// Pause replication into every replica
    pub fn pause_replication(&self) {
        for replicator in &self.replicators {
            replicator.pause();
        }
        tracing::info!(bucket = %self.name, "Replication paused");
    }

    /// Resume replication into every replica
    pub fn resume_replication(&self) {
        for replicator in &self.replicators {
            replicator.resume();
        }
        tracing::info!(bucket = %self.name, "Replication resumed");
    }

    /// Replication progress for every replica
    pub fn replication_status(&self) -> Vec<ReplicaStatus> {
        self.replicators
            .iter()
            .enumerate()
            .map(|(idx, replicator)| {
                let replica = idx + 1;
                let pending_seq_nos = self.vbuckets[0]
                    .iter()
                    .enumerate()
                    .map(|(vb_idx, active)| {
                        let replicated: SeqNo = replicator.replicated_seq_no(vb_idx).unwrap_or(0);
                        active.max_seq_no().saturating_sub(replicated)
                    })
                    .sum();
                let stats = replicator.stats();

                ReplicaStatus {
                    replica,
                    paused: replicator.is_paused(),
                    replicated_mutations: stats.mutations_replicated,
                    pending_seq_nos,
                    fetch_anomalies: stats.fetch_anomalies,
                    next_wake: replicator.next_wake(),
                }
            })
            .collect()
    }

    /// Check if every replica has caught up with the active copy
    pub fn is_fully_replicated(&self) -> bool {
        self.replication_status()
            .iter()
            .all(|status| status.pending_seq_nos == 0)
    }

    fn signal_replicators(&self, vb_id: VbId) {
        for replicator in &self.replicators {
            replicator.signal(usize::from(vb_id));
        }
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("num_vbuckets", &self.num_vbuckets)
            .field("num_replicas", &self.replicators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_bucket(num_replicas: usize, latency_ms: u64) -> (Arc<Chrono>, Bucket) {
        let chrono = Arc::new(Chrono::new());
        let config = BucketConfig {
            name: "test".to_string(),
            num_vbuckets: 16,
            num_replicas,
            replication_latency_ms: latency_ms,
        };
        let bucket = Bucket::new(chrono.clone(), &config).unwrap();
        (chrono, bucket)
    }

    #[test]
    fn test_vb_id_for_key_is_stable() {
        let (_chrono, bucket) = test_bucket(1, 10);
        let vb = bucket.vb_id_for_key("user::42");
        assert!(vb < 16);
        assert_eq!(vb, bucket.vb_id_for_key("user::42"));
    }

    #[test]
    fn test_replica_reads_after_latency() {
        let (chrono, bucket) = test_bucket(2, 100);

        let written = bucket.upsert("hello", b"world".to_vec(), 3).unwrap();
        assert_eq!(bucket.get(0, "hello").unwrap().unwrap(), written);
        assert!(bucket.get(1, "hello").unwrap().is_none());
        assert!(bucket.get(2, "hello").unwrap().is_none());
        assert!(!bucket.is_fully_replicated());

        chrono.advance(Duration::from_millis(100)).unwrap();
        assert_eq!(bucket.get(1, "hello").unwrap().unwrap(), written);
        assert_eq!(bucket.get(2, "hello").unwrap().unwrap(), written);
        assert!(bucket.is_fully_replicated());
    }

    #[test]
    fn test_remove_replicates_tombstone() {
        let (chrono, bucket) = test_bucket(1, 10);

        assert!(matches!(bucket.remove("ghost"), Err(Error::DocumentNotFound(_))));

        bucket.upsert("doc", b"v".to_vec(), 0).unwrap();
        chrono.advance(Duration::from_millis(10)).unwrap();
        assert!(bucket.get(1, "doc").unwrap().is_some());

        let tombstone = bucket.remove("doc").unwrap();
        assert!(tombstone.is_tombstone());
        assert!(bucket.get(0, "doc").unwrap().is_none());
        assert!(bucket.get(1, "doc").unwrap().is_some());

        chrono.advance(Duration::from_millis(10)).unwrap();
        assert!(bucket.get(1, "doc").unwrap().is_none());
    }

    #[test]
    fn test_pause_and_resume_replication() {
        let (chrono, bucket) = test_bucket(1, 10);
        bucket.pause_replication();

        bucket.upsert("a", vec![], 0).unwrap();
        bucket.upsert("b", vec![], 0).unwrap();
        chrono.advance(Duration::from_secs(1)).unwrap();

        let status = &bucket.replication_status()[0];
        assert!(status.paused);
        assert_eq!(status.pending_seq_nos, 2);
        assert_eq!(status.replicated_mutations, 0);

        bucket.resume_replication();
        let status = &bucket.replication_status()[0];
        assert!(!status.paused);
        assert_eq!(status.pending_seq_nos, 0);
        assert_eq!(status.replicated_mutations, 2);
        assert!(status.next_wake.is_none());
    }

    #[test]
    fn test_lookup_errors() {
        let (_chrono, bucket) = test_bucket(1, 10);
        assert!(matches!(bucket.vbucket(2, 0), Err(Error::ReplicaNotFound(2))));
        assert!(matches!(bucket.vbucket(0, 16), Err(Error::VbucketNotFound(16))));
        assert!(bucket.replicator(0).is_none());
        assert!(bucket.replicator(1).is_some());
        assert!(bucket.replicator(2).is_none());
    }

    #[test]
    fn test_no_replicas() {
        let (_chrono, bucket) = test_bucket(0, 10);
        bucket.upsert("solo", vec![], 0).unwrap();
        assert_eq!(bucket.num_replicas(), 0);
        assert!(bucket.replication_status().is_empty());
        assert!(bucket.is_fully_replicated());
    }
}
