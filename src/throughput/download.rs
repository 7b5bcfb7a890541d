//! Speed worker: download a test payload over a pre-dialed connection.

use std::time::Duration;

use http_body_util::BodyExt;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

use super::SpeedSettings;
use crate::probes::transport::{self, HttpSession};
use crate::probes::ProbeFailure;

/// Bytes received over a measured window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadSample {
    pub bytes: u64,
    pub elapsed: Duration,
    /// The timeout ended the window before the body was complete.
    pub truncated: bool,
}

impl DownloadSample {
    /// Throughput in kB/s (1 kB = 1024 bytes).
    pub fn kbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs / 1024.0
    }
}

/// Download the payload from `address:port`, discarding the body as it
/// arrives. When the timeout fires mid-body, the bytes received so far make
/// up the sample.
pub async fn download(
    address: &str,
    port: u16,
    settings: &SpeedSettings,
    tls: Option<&TlsConnector>,
) -> Result<DownloadSample, ProbeFailure> {
    let (stream, _) = transport::dial(address, port, settings.dial_timeout).await?;
    let (host, target) = transport::split_target(&settings.url);

    let start = Instant::now();
    let deadline = start + settings.timeout;

    let mut session = timeout_at(deadline, HttpSession::open(stream, tls, host))
        .await
        .map_err(|_| ProbeFailure::RequestTimeout)??;
    let request = transport::get_request(host, target, &settings.user_agent)?;
    let response = timeout_at(deadline, session.send(request))
        .await
        .map_err(|_| ProbeFailure::RequestTimeout)??;

    let mut body = response.into_body();
    let mut bytes = 0u64;
    let mut truncated = false;
    loop {
        match timeout_at(deadline, body.frame()).await {
            Err(_) => {
                truncated = true;
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => return Err(ProbeFailure::RequestFailed(e.to_string())),
            Ok(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    bytes += data.len() as u64;
                }
            }
        }
    }

    Ok(DownloadSample {
        bytes,
        elapsed: start.elapsed(),
        truncated,
    })
}

/// Measure download speed in kB/s. Any failure yields `0.0`.
pub async fn measure(
    address: &str,
    port: u16,
    settings: &SpeedSettings,
    tls: Option<&TlsConnector>,
) -> f64 {
    info!(%address, port, "testing download speed");
    match download(address, port, settings, tls).await {
        Ok(sample) => {
            let kbps = sample.kbps();
            info!(%address, port, kbps = kbps.round(), bytes = sample.bytes, truncated = sample.truncated, "download speed measured");
            kbps
        }
        Err(failure) => {
            warn!(%address, port, reason = failure.kind(), error = %failure, "speed test failed");
            0.0
        }
    }
}
