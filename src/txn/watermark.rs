//! Low-watermark provider.
//!
//! Per COMMIT_PIPELINE.md §4:
//! - The low watermark is the lowest globally ordered transaction the whole
//!   cluster can treat as durably applied; everything below it is
//!   reclaimable
//! - Recomputed on the first commit of a run and every N commits thereafter
//!   (N is a tuned amortization constant, configurable, default 100)
//! - Monotonically non-decreasing

use super::sequence::GlobalSeq;

pub const DEFAULT_WATERMARK_INTERVAL: u64 = 100;

/// Tracks the low watermark and the recomputation cadence.
#[derive(Debug)]
pub struct WatermarkProvider {
    interval: u64,
    commits_since_recompute: u64,
    ever_computed: bool,
    low: GlobalSeq,
}

impl WatermarkProvider {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            commits_since_recompute: 0,
            ever_computed: false,
            low: GlobalSeq::new(0),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Current low watermark. Zero until the first recomputation.
    pub fn low_watermark(&self) -> GlobalSeq {
        self.low
    }

    /// Record one commit; true when the watermark is due for recomputation
    /// (first commit of a run, then every `interval` commits).
    pub fn on_commit(&mut self) -> bool {
        if !self.ever_computed {
            return true;
        }
        self.commits_since_recompute += 1;
        self.commits_since_recompute >= self.interval
    }

    /// Install a freshly computed watermark. The watermark never regresses:
    /// a lower candidate leaves the current value in place.
    pub fn update(&mut self, candidate: GlobalSeq) -> GlobalSeq {
        self.ever_computed = true;
        self.commits_since_recompute = 0;
        if candidate > self.low {
            self.low = candidate;
        }
        self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_commit_triggers_recompute() {
        let mut provider = WatermarkProvider::new(100);
        assert!(provider.on_commit());
        provider.update(GlobalSeq::new(5));
        assert!(!provider.on_commit());
    }

    #[test]
    fn test_recompute_every_interval() {
        let mut provider = WatermarkProvider::new(3);
        provider.update(GlobalSeq::new(1));
        assert!(!provider.on_commit()); // 1
        assert!(!provider.on_commit()); // 2
        assert!(provider.on_commit()); // 3 -> due
        provider.update(GlobalSeq::new(2));
        assert!(!provider.on_commit());
    }

    #[test]
    fn test_watermark_never_regresses() {
        let mut provider = WatermarkProvider::new(1);
        assert_eq!(provider.update(GlobalSeq::new(10)), GlobalSeq::new(10));
        assert_eq!(provider.update(GlobalSeq::new(7)), GlobalSeq::new(10));
        assert_eq!(provider.update(GlobalSeq::new(12)), GlobalSeq::new(12));
        assert_eq!(provider.low_watermark(), GlobalSeq::new(12));
    }

    #[test]
    fn test_interval_floor_is_one() {
        let provider = WatermarkProvider::new(0);
        assert_eq!(provider.interval(), 1);
    }
}
