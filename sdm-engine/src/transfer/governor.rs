//! Transfer speed governor
//!
//! One governor is shared by every active segment, so the configured limit
//! bounds aggregate throughput. Throttling delays each chunk in proportion
//! to its size: delay_ms = bytes * 1000 / limit.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Shared, runtime-adjustable speed limit
pub struct SpeedGovernor {
    max_bytes_per_sec: AtomicI64,
}

impl SpeedGovernor {
    /// `limit` in bytes per second; 0 or negative means unlimited
    pub fn new(limit: i64) -> Self {
        Self {
            max_bytes_per_sec: AtomicI64::new(limit),
        }
    }

    pub fn limit(&self) -> i64 {
        self.max_bytes_per_sec.load(Ordering::Relaxed)
    }

    /// Takes effect on the next throttled chunk
    pub fn set_limit(&self, limit: i64) {
        self.max_bytes_per_sec.store(limit, Ordering::Relaxed);
    }

    /// Sleep long enough that `bytes_just_processed` stays under the limit
    pub async fn throttle(&self, bytes_just_processed: usize) {
        if let Some(delay) = throttle_delay(bytes_just_processed, self.limit()) {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Delay owed for a chunk of `bytes` under `limit`; None when no sleep is
/// needed (unlimited, or the delay rounds below 1 ms)
fn throttle_delay(bytes: usize, limit: i64) -> Option<Duration> {
    if limit <= 0 {
        return None;
    }

    let delay_ms = (bytes as f64 * 1000.0) / limit as f64;
    if delay_ms <= 1.0 {
        return None;
    }

    Some(Duration::from_millis(delay_ms as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_never_delays() {
        assert_eq!(throttle_delay(1 << 20, 0), None);
        assert_eq!(throttle_delay(1 << 20, -1), None);
    }

    #[test]
    fn test_tiny_chunk_not_delayed() {
        // 8 bytes at 1 MB/s rounds far below 1 ms
        assert_eq!(throttle_delay(8, 1_000_000), None);
    }

    #[test]
    fn test_delay_proportional_to_chunk() {
        // 64 KiB at 64 KiB/s is one second
        let delay = throttle_delay(65_536, 65_536).unwrap();
        assert_eq!(delay, Duration::from_millis(1000));

        // half the chunk, half the delay
        let delay = throttle_delay(32_768, 65_536).unwrap();
        assert_eq!(delay, Duration::from_millis(500));
    }

    #[test]
    fn test_limit_is_adjustable() {
        let governor = SpeedGovernor::new(0);
        assert_eq!(governor.limit(), 0);
        governor.set_limit(4096);
        assert_eq!(governor.limit(), 4096);
    }
}
