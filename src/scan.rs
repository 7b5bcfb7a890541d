//! Stage 1: probe every candidate with bounded concurrency.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Semaphore};
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

use crate::candidates::Candidate;
use crate::location::LocationTable;
use crate::pool::BoundedPool;
use crate::probes::{trace, ProbeFailure, ProbeResult, ProbeSettings};
use crate::progress::Progress;

/// Read-only state shared by every probe worker of a run.
pub struct ProbeContext {
    pub locations: Arc<LocationTable>,
    pub settings: ProbeSettings,
    pub tls: Option<TlsConnector>,
}

/// Count of dropped candidates per failure kind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FailureTally {
    counts: BTreeMap<&'static str, usize>,
}

impl FailureTally {
    pub fn record(&mut self, failure: &ProbeFailure) {
        *self.counts.entry(failure.kind()).or_default() += 1;
    }

    pub fn get(&self, kind: &str) -> usize {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }
}

impl fmt::Display for FailureTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counts.is_empty() {
            return write!(f, "none");
        }
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Verified endpoints (in completion order) and the reasons others were dropped.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub results: Vec<ProbeResult>,
    pub failures: FailureTally,
}

/// Probe all `candidates`, running at most as many workers as `gate` has
/// permits. Returns once every worker has finished.
pub async fn run_probes(
    candidates: Vec<Candidate>,
    ctx: Arc<ProbeContext>,
    gate: Arc<Semaphore>,
) -> Result<ScanOutcome> {
    let total = candidates.len();
    info!(total, permits = gate.available_permits(), "probing candidates");

    // One slot per candidate: a send never waits.
    let (tx, mut rx) = mpsc::channel::<ProbeResult>(total.max(1));
    let progress = Arc::new(Progress::new("probe", total));
    let mut pool = BoundedPool::new(gate);

    for candidate in candidates {
        let tx = tx.clone();
        let ctx = ctx.clone();
        let progress = progress.clone();
        pool.submit(async move {
            let outcome =
                trace::probe_logged(&candidate, &ctx.locations, &ctx.settings, ctx.tls.as_ref())
                    .await;
            progress.tick();
            match outcome {
                Ok(result) => {
                    if let Err(e) = tx.try_send(result) {
                        warn!(error = %e, "result channel rejected probe result");
                    }
                    None
                }
                Err(failure) => Some(failure),
            }
        })
        .await?;
    }
    drop(tx);

    let mut failures = FailureTally::default();
    for failure in pool.join().await.into_iter().flatten() {
        failures.record(&failure);
    }

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }

    info!(verified = results.len(), dropped = failures.total(), %failures, "probing finished");
    Ok(ScanOutcome { results, failures })
}
