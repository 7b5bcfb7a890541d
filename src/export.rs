//! CSV export of ranked results.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::throughput::report::speed_label;
use crate::throughput::SpeedResult;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const HEADER: [&str; 7] = [
    "IP Address",
    "Port",
    "TLS",
    "Data Center",
    "Region",
    "City",
    "Latency",
];

const SPEED_COLUMN: &str = "Download Speed";

/// Write a BOM-prefixed CSV document to `out`. The download speed column is
/// present only when `with_speed` is set.
pub fn write_csv<W: Write>(
    mut out: W,
    results: &[SpeedResult],
    tls: bool,
    with_speed: bool,
) -> Result<()> {
    out.write_all(UTF8_BOM)?;
    let mut wtr = csv::Writer::from_writer(out);

    let mut header: Vec<&str> = HEADER.to_vec();
    if with_speed {
        header.push(SPEED_COLUMN);
    }
    wtr.write_record(&header)?;

    let tls = tls.to_string();
    for result in results {
        let probe = &result.probe;
        let port = probe.port.to_string();
        let speed = with_speed.then(|| speed_label(result.download_kbps));
        let mut row = vec![
            probe.address.as_str(),
            port.as_str(),
            tls.as_str(),
            probe.facility_code.as_str(),
            probe.region.as_str(),
            probe.city.as_str(),
            probe.latency_label.as_str(),
        ];
        if let Some(speed) = &speed {
            row.push(speed.as_str());
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Create `path` and write the export into it.
pub fn export_file(
    path: &Path,
    results: &[SpeedResult],
    tls: bool,
    with_speed: bool,
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    write_csv(BufWriter::new(file), results, tls, with_speed)
        .with_context(|| format!("failed to write output file: {}", path.display()))?;
    info!(path = %path.display(), rows = results.len(), "results exported");
    Ok(())
}
