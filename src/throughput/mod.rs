//! Stage 2: optional download-speed measurement of verified endpoints.

pub mod download;
pub mod report;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{Mutex, Semaphore};
use tokio_rustls::TlsConnector;
use tracing::info;

use crate::pool::BoundedPool;
use crate::probes::ProbeResult;
use crate::progress::Progress;

pub const DEFAULT_SPEED_URL: &str = "speed.bestip.one/__down?bytes=50000000";

/// Settings for the speed worker.
#[derive(Debug, Clone)]
pub struct SpeedSettings {
    /// Payload URL; any scheme prefix is ignored, TLS is used when a
    /// connector is supplied.
    pub url: String,
    pub dial_timeout: Duration,
    /// Bound on the whole request, body included.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SPEED_URL.to_string(),
            dial_timeout: Duration::from_millis(1000),
            timeout: Duration::from_secs(5),
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

/// A verified endpoint with its measured download speed.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedResult {
    pub probe: ProbeResult,
    /// kB/s; zero when the measurement failed or was not run.
    pub download_kbps: f64,
}

impl SpeedResult {
    pub fn unmeasured(probe: ProbeResult) -> Self {
        Self {
            probe,
            download_kbps: 0.0,
        }
    }
}

/// Measure every result with `workers` concurrent consumers pulling from one
/// shared queue. Consumers draw their permits from `gate`, so at most
/// `min(workers, permits)` downloads run at once. With `workers == 0` nothing
/// is measured.
pub async fn run_speed_tests(
    results: Vec<ProbeResult>,
    workers: usize,
    settings: Arc<SpeedSettings>,
    tls: Option<TlsConnector>,
    gate: Arc<Semaphore>,
) -> Result<Vec<SpeedResult>> {
    if workers == 0 {
        return Ok(results.into_iter().map(SpeedResult::unmeasured).collect());
    }

    let total = results.len();
    info!(total, workers, "starting speed tests");

    let queue = Arc::new(Mutex::new(VecDeque::from(results)));
    let measured = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let progress = Arc::new(Progress::new("speed", total));
    let mut pool = BoundedPool::new(gate);

    for _ in 0..workers {
        let queue = queue.clone();
        let measured = measured.clone();
        let progress = progress.clone();
        let settings = settings.clone();
        let tls = tls.clone();
        pool.submit(async move {
            loop {
                let next = queue.lock().await.pop_front();
                let Some(probe) = next else { break };

                let download_kbps =
                    download::measure(&probe.address, probe.port, &settings, tls.as_ref()).await;
                measured.lock().await.push(SpeedResult {
                    probe,
                    download_kbps,
                });
                progress.tick();
            }
        })
        .await?;
    }
    pool.join().await;

    let out = std::mem::take(&mut *measured.lock().await);
    info!(measured = out.len(), "speed tests finished");
    Ok(out)
}
