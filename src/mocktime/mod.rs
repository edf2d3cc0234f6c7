//! Mock Time Module
//!
//! A controllable virtual clock shared by every time-dependent component
//! of the mock server. Time only moves when a test (or the workload driver)
//! advances it, which makes latency-dependent behaviour deterministic.

mod clock;

pub use clock::{Chrono, TimerId, WOLFCAVE_EPOCH_MS};

use chrono::{DateTime, Utc};

/// Add a std duration to a virtual timestamp, saturating at the end of time.
pub fn saturating_add(at: DateTime<Utc>, delta: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delta)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Duration from `earlier` until `later`, zero if `later` is not after `earlier`.
pub fn duration_until(earlier: DateTime<Utc>, later: DateTime<Utc>) -> std::time::Duration {
    (later - earlier).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_saturating_add() {
        let start = Chrono::new().now();
        let later = saturating_add(start, Duration::from_secs(5));
        assert_eq!((later - start).num_seconds(), 5);

        let end = saturating_add(start, Duration::MAX);
        assert_eq!(end, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_duration_until() {
        let start = Chrono::new().now();
        let later = saturating_add(start, Duration::from_millis(1500));
        assert_eq!(duration_until(start, later), Duration::from_millis(1500));
        assert_eq!(duration_until(later, start), Duration::ZERO);
    }
}
