use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use edgescout::config::ScanConfig;
use edgescout::rank::RankMode;
use edgescout::throughput::report::format_summary;

#[derive(Parser)]
#[command(
    name = "edgescout",
    about = "Finds the fastest reachable CDN edge endpoints from a candidate list",
    version,
    long_about = None
)]
struct Cli {
    /// Candidate file, one `address port` per line [default: ip.txt]
    #[arg(long)]
    file: Option<PathBuf>,

    /// CSV output file [default: ip.csv]
    #[arg(long)]
    outfile: Option<PathBuf>,

    /// Maximum concurrent probes [default: 20]
    #[arg(long)]
    max: Option<usize>,

    /// Download speed-test workers, 0 disables speed testing [default: 0]
    #[arg(long)]
    speedtest: Option<usize>,

    /// Speed-test payload URL, without scheme [default: speed.bestip.one/__down?bytes=50000000]
    #[arg(long)]
    url: Option<String>,

    /// Use TLS for trace requests and speed tests
    #[arg(long)]
    tls: bool,

    /// Host named in trace requests [default: www.speedtest.net]
    #[arg(long)]
    tcpurl: Option<String>,

    /// Expand CIDR blocks in the candidate file
    #[arg(long)]
    expand_cidr: bool,

    /// Location table cache file [default: locations.json]
    #[arg(long)]
    locations: Option<PathBuf>,

    /// URL the location table is downloaded from when the cache is missing
    /// [default: https://speed.bestip.one/locations]
    #[arg(long)]
    locations_url: Option<String>,

    /// TOML config file (defaults to $EDGESCOUT_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Apply explicitly given flags on top of the loaded configuration.
    fn apply(self, cfg: &mut ScanConfig) {
        if let Some(file) = self.file {
            cfg.input.candidates = file;
        }
        if let Some(outfile) = self.outfile {
            cfg.input.output = outfile;
        }
        if let Some(max) = self.max {
            cfg.probe.max_concurrency = max;
        }
        if let Some(workers) = self.speedtest {
            cfg.speed.workers = workers;
        }
        if let Some(url) = self.url {
            cfg.speed.url = url;
        }
        if self.tls {
            cfg.probe.tls = true;
        }
        if let Some(host) = self.tcpurl {
            cfg.probe.trace_host = host;
        }
        if self.expand_cidr {
            cfg.input.expand_cidr = true;
        }
        if let Some(cache) = self.locations {
            cfg.locations.cache = cache;
        }
        if let Some(url) = self.locations_url {
            cfg.locations.url = url;
        }
        if self.log_json {
            cfg.logging.json = true;
        }
    }
}

fn init_tracing(cfg: &ScanConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    if cfg.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ScanConfig::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);
    init_tracing(&config);

    tracing::info!(
        file = %config.input.candidates.display(),
        outfile = %config.input.output.display(),
        max = config.probe.max_concurrency,
        speedtest = config.speed.workers,
        tls = config.probe.tls,
        trace_host = %config.probe.trace_host,
        "starting scan"
    );

    let summary = edgescout::run(&config).await?;
    let secs = summary.elapsed.as_secs();

    println!();
    if summary.verified() == 0 {
        println!(
            "No verified endpoints found among {} candidates ({}s)",
            summary.candidates, secs
        );
        println!("Dropped: {}", summary.failures);
        return Ok(());
    }

    println!(
        "Verified {} of {} candidates (dropped: {})",
        summary.verified(),
        summary.candidates,
        summary.failures
    );
    let heading = match summary.mode {
        RankMode::Throughput => "Fastest by download speed:",
        RankMode::Latency => "Fastest by latency:",
    };
    println!("{heading}");
    let with_speed = summary.mode == RankMode::Throughput;
    for result in summary.results.iter().take(5) {
        println!("  {}", format_summary(result, with_speed));
    }
    if let Some(path) = &summary.exported {
        println!("Wrote results to {} in {}s", path.display(), secs);
    }

    Ok(())
}
