//! Store Module
//!
//! In-memory document storage for the mock server: vbuckets holding
//! ordered mutation history, the replicator that copies that history to
//! replica vbuckets, and the bucket that wires them together.

pub mod mutation;
pub mod vbucket;
pub mod replicator;
pub mod bucket;

pub use mutation::{Mutation, SeqNo, VbId};
pub use vbucket::{DestinationPartition, SourcePartition, Vbucket};
pub use replicator::{Replicator, ReplicatorConfig, ReplicatorStats};
pub use bucket::{Bucket, ReplicaStatus};
