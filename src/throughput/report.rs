//! Speed formatting for console output and export.

use super::SpeedResult;

/// Export label: MB/s with two decimals (`kB/s / 1024`).
pub fn speed_label(kbps: f64) -> String {
    format!("{:.2} MB/s", kbps / 1024.0)
}

/// One-line human-readable summary of an endpoint. The download speed is
/// included only when `with_speed` is set.
pub fn format_summary(result: &SpeedResult, with_speed: bool) -> String {
    let probe = &result.probe;
    let location = if probe.city.is_empty() {
        probe.facility_code.clone()
    } else {
        format!("{} ({})", probe.facility_code, probe.city)
    };

    let mut summary = format!(
        "{}:{} {} latency {}",
        probe.address, probe.port, location, probe.latency_label,
    );
    if with_speed {
        summary.push_str(&format!(" download {}", speed_label(result.download_kbps)));
    }
    summary
}
