//! Probe worker: verify one candidate is an edge node and locate it.

use std::sync::OnceLock;

use http_body_util::{BodyExt, Limited};
use regex::Regex;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use super::deadline;
use super::transport::{self, HttpSession};
use super::{
    latency_label, ProbeFailure, ProbeResult, ProbeSettings, TRACE_PATH, TRACE_USER_AGENT,
};
use crate::candidates::Candidate;
use crate::location::LocationTable;

/// Trace bodies are a few hundred bytes; anything far larger is not a trace.
const MAX_TRACE_BODY: usize = 64 * 1024;

fn colo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"colo=([A-Z]+)").expect("valid colo pattern"))
}

/// Extract the facility code from a trace body. The body must echo the
/// User-Agent we sent; otherwise the responder is not trusted.
pub fn facility_code(body: &str) -> Result<&str, ProbeFailure> {
    let echo = format!("uag={TRACE_USER_AGENT}");
    if !body.contains(&echo) {
        return Err(ProbeFailure::NoMatch);
    }
    colo_pattern()
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ProbeFailure::NoMatch)
}

/// Probe one candidate. Returns a result only when both the TCP connect and
/// the trace identity check succeed within their deadlines.
pub async fn probe(
    candidate: &Candidate,
    locations: &LocationTable,
    settings: &ProbeSettings,
    tls: Option<&TlsConnector>,
) -> Result<ProbeResult, ProbeFailure> {
    if candidate.address.is_empty() || candidate.port == 0 {
        return Err(ProbeFailure::MalformedInput(candidate.to_string()));
    }

    let (stream, latency) =
        transport::dial(&candidate.address, candidate.port, settings.dial_timeout).await?;

    let read_by = Instant::now() + settings.total_deadline;
    let headers_by = read_by.min(Instant::now() + settings.request_timeout);

    let mut session = timeout_at(
        headers_by,
        HttpSession::open(stream, tls, &settings.trace_host),
    )
    .await
    .map_err(|_| ProbeFailure::RequestTimeout)??;

    let request = transport::get_request(&settings.trace_host, TRACE_PATH, TRACE_USER_AGENT)?;
    let response = timeout_at(headers_by, session.send(request))
        .await
        .map_err(|_| ProbeFailure::RequestTimeout)??;

    let body = Limited::new(response.into_body(), MAX_TRACE_BODY);
    let bytes = deadline::race(
        async move { body.collect().await.map(|collected| collected.to_bytes()) },
        read_by,
    )
    .await
    .ok_or(ProbeFailure::BodyTimeout)?
    .map_err(|e| ProbeFailure::RequestFailed(e.to_string()))?;
    drop(session);

    let text = String::from_utf8_lossy(&bytes);
    let code = facility_code(&text)?.to_string();
    let latency_ms = latency.as_millis() as u64;

    let (region, city) = match locations.get(&code) {
        Some(loc) => {
            info!(address = %candidate.address, port = candidate.port, colo = %code, city = %loc.city, latency_ms, "verified edge endpoint");
            (loc.region.clone(), loc.city.clone())
        }
        None => {
            info!(address = %candidate.address, port = candidate.port, colo = %code, latency_ms, "verified edge endpoint, location unknown");
            (String::new(), String::new())
        }
    };

    Ok(ProbeResult {
        address: candidate.address.clone(),
        port: candidate.port,
        facility_code: code,
        region,
        city,
        latency_label: latency_label(latency),
        latency,
    })
}

/// [`probe`] with the failure logged and discarded.
pub async fn probe_logged(
    candidate: &Candidate,
    locations: &LocationTable,
    settings: &ProbeSettings,
    tls: Option<&TlsConnector>,
) -> Result<ProbeResult, ProbeFailure> {
    let outcome = probe(candidate, locations, settings, tls).await;
    if let Err(failure) = &outcome {
        debug!(address = %candidate.address, port = candidate.port, reason = failure.kind(), error = %failure, "candidate dropped");
    }
    outcome
}
