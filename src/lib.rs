//! WolfCave - Mock Bucket Server Core
//!
//! An in-memory mock of a distributed document store, used to exercise
//! client protocol behaviour against replicas that lag the active copy by
//! a controllable amount of time.
//!
//! # Architecture
//!
//! Every time-dependent component shares one virtual clock
//! ([`mocktime::Chrono`]). Writes land on a bucket's active vbuckets and
//! are copied to replica vbuckets by a [`store::Replicator`] once the
//! configured replication latency has elapsed in virtual time. Tests move
//! the clock forward explicitly, so replication is fully deterministic.
//!
//! # Features
//!
//! - Per-vbucket replication cursors with exactly-once forwarding
//! - A single consolidated wake-up timer per replicator
//! - Pause/resume of replication for fault-injection tests
//! - Seeded workload driver with instant or real-time pacing

pub mod config;
pub mod error;
pub mod mocktime;
pub mod store;
pub mod workload;

pub use config::WolfCaveConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfCaveConfig;
    pub use crate::error::{Error, Result};
    pub use crate::mocktime::Chrono;
    pub use crate::store::{Bucket, Mutation, Replicator, ReplicatorConfig, Vbucket};
    pub use crate::store::{DestinationPartition, SourcePartition};
    pub use crate::workload::{Pacing, Workload};
}
