//! Edge membership probe: TCP connect timing plus a `/cdn-cgi/trace`
//! identity check over the same connection.

use std::time::Duration;

use thiserror::Error;

pub mod deadline;
pub mod trace;
pub mod transport;

/// Browser User-Agent sent with every trace request. Edge nodes echo it back
/// as `uag=...` in the trace body.
pub const TRACE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";

pub const TRACE_PATH: &str = "/cdn-cgi/trace";

/// Per-candidate probe settings.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Bound on the TCP handshake.
    pub dial_timeout: Duration,
    /// Bound on receiving response headers.
    pub request_timeout: Duration,
    /// Bound on request plus body read, measured from the end of the handshake.
    pub total_deadline: Duration,
    pub tls: bool,
    /// Host named in the trace request (`Host` header and TLS SNI).
    pub trace_host: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_millis(1000),
            request_timeout: Duration::from_millis(1000),
            total_deadline: Duration::from_millis(2500),
            tls: false,
            trace_host: "www.speedtest.net".to_string(),
        }
    }
}

/// A verified edge endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub address: String,
    pub port: u16,
    pub facility_code: String,
    pub region: String,
    pub city: String,
    pub latency_label: String,
    pub latency: Duration,
}

/// Why a candidate was dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("TCP connect timed out")]
    DialTimeout,

    #[error("TCP connect failed: {0}")]
    DialRefused(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("response headers not received in time")]
    RequestTimeout,

    #[error("response body not received before the deadline")]
    BodyTimeout,

    #[error("response is not an edge trace")]
    NoMatch,
}

impl ProbeFailure {
    /// Stable short name used in summaries and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeFailure::MalformedInput(_) => "malformed-input",
            ProbeFailure::DialTimeout => "dial-timeout",
            ProbeFailure::DialRefused(_) => "dial-refused",
            ProbeFailure::RequestFailed(_) => "request-failed",
            ProbeFailure::RequestTimeout => "request-timeout",
            ProbeFailure::BodyTimeout => "body-timeout",
            ProbeFailure::NoMatch => "no-match",
        }
    }
}

/// Latency label as exported, whole milliseconds.
pub fn latency_label(latency: Duration) -> String {
    format!("{} ms", latency.as_millis())
}
