//! Final ordering of results.

use crate::throughput::SpeedResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMode {
    /// Fastest TCP connect first.
    Latency,
    /// Highest download speed first.
    Throughput,
}

/// Sort `results` in place. The sort is stable, so ties keep arrival order.
pub fn rank(results: &mut [SpeedResult], mode: RankMode) {
    match mode {
        RankMode::Latency => results.sort_by_key(|r| r.probe.latency),
        RankMode::Throughput => {
            results.sort_by(|a, b| b.download_kbps.total_cmp(&a.download_kbps))
        }
    }
}
