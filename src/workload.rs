//! Workload Driver
//!
//! Writes a seeded stream of documents into a bucket while moving the
//! virtual clock forward, then drains every pending replication wake-up.
//! The clock can be advanced instantly or paced against wall-clock time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::WorkloadConfig;
use crate::error::Result;
use crate::mocktime::{self, Chrono};
use crate::store::{Bucket, ReplicaStatus};

/// How virtual time is advanced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Jump the clock forward immediately
    Instant,
    /// Sleep `delta / speed` of real time before each jump
    Realtime { speed: f64 },
}

impl Pacing {
    async fn advance(&self, chrono: &Chrono, by: Duration) -> Result<usize> {
        if let Pacing::Realtime { speed } = *self {
            if speed > 0.0 && !by.is_zero() {
                tokio::time::sleep(by.div_f64(speed)).await;
            }
        }
        chrono.advance(by)
    }
}

/// Outcome of a workload run
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    pub bucket: String,
    pub documents_written: usize,
    pub bytes_written: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Virtual milliseconds between the first write and full replication
    pub virtual_elapsed_ms: i64,
    pub timers_fired: usize,
    pub fully_replicated: bool,
    pub replicas: Vec<ReplicaStatus>,
}

/// Generates documents and drives the clock
pub struct Workload {
    config: WorkloadConfig,
    rng: StdRng,
}

impl Workload {
    /// Create a workload with a deterministic RNG
    pub fn new(config: WorkloadConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Write every document and wait, in virtual time, for replication to finish.
    ///
    /// If replication is paused nothing drains and the report says so.
    pub async fn run(&mut self, bucket: &Bucket, chrono: &Chrono, pacing: Pacing) -> Result<WorkloadReport> {
        let started_at = chrono.now();
        let mut timers_fired = 0;
        let mut bytes_written = 0u64;

        tracing::info!(
            documents = self.config.documents,
            interval_ms = self.config.write_interval_ms,
            ?pacing,
            "Starting workload"
        );

        for i in 0..self.config.documents {
            let key = format!("{}{}", self.config.key_prefix, i);
            let value = self.next_value(i);
            bytes_written += value.len() as u64;

            let mutation = bucket.upsert(&key, value, 0)?;
            tracing::debug!(%mutation, "Document written");

            let gap = self.next_gap();
            timers_fired += pacing.advance(chrono, gap).await?;
        }

        // Drain replication: jump straight to each wake-up
        while let Some(deadline) = chrono.next_deadline() {
            let wait = mocktime::duration_until(chrono.now(), deadline);
            timers_fired += pacing.advance(chrono, wait).await?;
        }

        let finished_at = chrono.now();
        let report = WorkloadReport {
            bucket: bucket.name().to_string(),
            documents_written: self.config.documents,
            bytes_written,
            started_at,
            finished_at,
            virtual_elapsed_ms: (finished_at - started_at).num_milliseconds(),
            timers_fired,
            fully_replicated: bucket.is_fully_replicated(),
            replicas: bucket.replication_status(),
        };

        tracing::info!(
            documents = report.documents_written,
            elapsed_ms = report.virtual_elapsed_ms,
            fully_replicated = report.fully_replicated,
            "Workload finished"
        );
        Ok(report)
    }

    fn next_value(&mut self, i: usize) -> Vec<u8> {
        let mut value = format!("{{\"n\":{}", i).into_bytes();
        let padding = self.config.value_size.saturating_sub(value.len() + 1);
        value.extend((0..padding).map(|_| self.rng.gen_range(b'a'..=b'z')));
        value.push(b'}');
        value
    }

    fn next_gap(&mut self) -> Duration {
        let base = self.config.write_interval_ms;
        let jitter = self.config.jitter_ms.min(base);
        let ms = if jitter == 0 {
            base
        } else {
            self.rng.gen_range(base - jitter..=base + jitter)
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketConfig;
    use std::sync::Arc;

    fn test_config() -> WorkloadConfig {
        WorkloadConfig {
            documents: 25,
            write_interval_ms: 10,
            jitter_ms: 4,
            value_size: 32,
            key_prefix: "k".to_string(),
            seed: 7,
        }
    }

    fn test_bucket(chrono: Arc<Chrono>) -> Bucket {
        let config = BucketConfig {
            name: "load".to_string(),
            num_vbuckets: 8,
            num_replicas: 2,
            replication_latency_ms: 40,
        };
        Bucket::new(chrono, &config).unwrap()
    }

    #[tokio::test]
    async fn test_instant_run_replicates_everything() {
        let chrono = Arc::new(Chrono::new());
        let bucket = test_bucket(chrono.clone());

        let report = Workload::new(test_config())
            .run(&bucket, &chrono, Pacing::Instant)
            .await
            .unwrap();

        assert_eq!(report.documents_written, 25);
        assert_eq!(report.bytes_written, 25 * 32);
        assert!(report.fully_replicated);
        assert_eq!(report.replicas.len(), 2);
        for replica in &report.replicas {
            assert_eq!(replica.replicated_mutations, 25);
            assert_eq!(replica.pending_seq_nos, 0);
        }
        assert_eq!(chrono.pending_timers(), 0);
        assert_eq!(bucket.get(2, "k24").unwrap().unwrap().value.len(), 32);
    }

    #[tokio::test]
    async fn test_same_seed_same_report() {
        let run = || async {
            let chrono = Arc::new(Chrono::new());
            let bucket = test_bucket(chrono.clone());
            Workload::new(test_config())
                .run(&bucket, &chrono, Pacing::Instant)
                .await
                .unwrap()
        };

        let first = run().await;
        let second = run().await;
        assert_eq!(first.virtual_elapsed_ms, second.virtual_elapsed_ms);
        assert_eq!(first.timers_fired, second.timers_fired);
        assert_eq!(first.finished_at, second.finished_at);
    }

    #[tokio::test]
    async fn test_paused_replication_is_reported() {
        let chrono = Arc::new(Chrono::new());
        let bucket = test_bucket(chrono.clone());
        bucket.pause_replication();

        let report = Workload::new(test_config())
            .run(&bucket, &chrono, Pacing::Instant)
            .await
            .unwrap();

        assert!(!report.fully_replicated);
        assert!(report.replicas.iter().all(|r| r.paused && r.replicated_mutations == 0));
    }

    #[tokio::test]
    async fn test_realtime_pacing() {
        let chrono = Arc::new(Chrono::new());
        let bucket = test_bucket(chrono.clone());
        let mut config = test_config();
        config.documents = 5;

        let report = Workload::new(config)
            .run(&bucket, &chrono, Pacing::Realtime { speed: 100.0 })
            .await
            .unwrap();

        assert!(report.fully_replicated);
        assert!(report.virtual_elapsed_ms >= 40);
    }
}
