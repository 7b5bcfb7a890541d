//! edgescout -- find the fastest reachable CDN edge endpoints.
//!
//! A run loads a candidate list, probes every candidate for edge membership
//! and TCP latency, optionally measures download speed of the verified
//! endpoints, then ranks and exports them as CSV.

pub mod candidates;
pub mod config;
pub mod export;
pub mod location;
pub mod pool;
pub mod probes;
pub mod progress;
pub mod rank;
pub mod scan;
pub mod system;
pub mod throughput;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::ScanConfig;
use crate::location::LocationTable;
use crate::rank::RankMode;
use crate::scan::{FailureTally, ProbeContext, ScanOutcome};
use crate::throughput::SpeedResult;

/// What a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub candidates: usize,
    pub failures: FailureTally,
    pub mode: RankMode,
    /// Ranked results; empty when nothing was verified.
    pub results: Vec<SpeedResult>,
    /// Export path, `None` when nothing was verified.
    pub exported: Option<PathBuf>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn verified(&self) -> usize {
        self.results.len()
    }
}

/// Run the whole pipeline: load inputs, probe, optionally speed-test, rank and
/// export. Setup failures abort the run before any output is written.
pub async fn run(config: &ScanConfig) -> Result<RunSummary> {
    let started = Instant::now();
    config.validate()?;

    if config.probe.raise_nofile {
        system::limits::raise_or_warn(system::limits::DESIRED_OPEN_FILES);
    }

    let locations = LocationTable::load(&config.locations.cache, &config.locations.url).await?;
    let candidates =
        candidates::load_candidates(&config.input.candidates, config.input.expand_cidr)?;
    let total = candidates.len();

    let tls = if config.probe.tls {
        Some(probes::transport::tls_connector()?)
    } else {
        None
    };
    let gate = pool::admission_gate(config.probe.max_concurrency);

    // 1. Probe
    let ctx = Arc::new(ProbeContext {
        locations: Arc::new(locations),
        settings: config.probe_settings(),
        tls: tls.clone(),
    });
    let ScanOutcome { results, failures } = scan::run_probes(candidates, ctx, gate.clone()).await?;

    let mode = if config.speed.workers > 0 {
        RankMode::Throughput
    } else {
        RankMode::Latency
    };

    if results.is_empty() {
        tracing::warn!(candidates = total, "no verified endpoints");
        return Ok(RunSummary {
            candidates: total,
            failures,
            mode,
            results: Vec::new(),
            exported: None,
            elapsed: started.elapsed(),
        });
    }

    // 2. Speed test (pass-through when disabled)
    let mut ranked = throughput::run_speed_tests(
        results,
        config.speed.workers,
        Arc::new(config.speed_settings()),
        tls,
        gate,
    )
    .await?;

    // 3. Rank and export
    rank::rank(&mut ranked, mode);
    export::export_file(
        &config.input.output,
        &ranked,
        config.probe.tls,
        mode == RankMode::Throughput,
    )?;

    Ok(RunSummary {
        candidates: total,
        failures,
        mode,
        results: ranked,
        exported: Some(config.input.output.clone()),
        elapsed: started.elapsed(),
    })
}
