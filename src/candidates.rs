//! Candidate list loading: one `address port` pair per line.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use cidr::IpCidr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Largest CIDR block accepted for expansion, in host bits.
const MAX_HOST_BITS: u32 = 16;

/// One endpoint to probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error("expected `address port`, found {0} field(s)")]
    FieldCount(usize),

    #[error("invalid port {0:?}")]
    InvalidPort(String),

    #[error("invalid CIDR block {0:?}")]
    InvalidCidr(String),

    #[error("CIDR block {0} is too large to expand")]
    CidrTooLarge(String),
}

impl FromStr for Candidate {
    type Err = CandidateError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [address, port] = fields.as_slice() else {
            return Err(CandidateError::FieldCount(fields.len()));
        };

        let port = match port.parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => return Err(CandidateError::InvalidPort(port.to_string())),
        };

        Ok(Self {
            address: address.to_string(),
            port,
        })
    }
}

/// Expand a candidate whose address is a CIDR block into one candidate per
/// address in the block, network and broadcast addresses included.
pub fn expand(candidate: Candidate) -> Result<Vec<Candidate>, CandidateError> {
    if !candidate.address.contains('/') {
        return Ok(vec![candidate]);
    }

    let block: IpCidr = candidate
        .address
        .parse()
        .map_err(|_| CandidateError::InvalidCidr(candidate.address.clone()))?;

    let host_bits = match block {
        IpCidr::V4(_) => 32,
        IpCidr::V6(_) => 128,
    } - u32::from(block.network_length());
    if host_bits > MAX_HOST_BITS {
        return Err(CandidateError::CidrTooLarge(candidate.address));
    }

    Ok(block
        .iter()
        .map(|inet| Candidate {
            address: inet.address().to_string(),
            port: candidate.port,
        })
        .collect())
}

/// Parse candidate text. Malformed lines are logged and skipped; blank lines
/// and `#` comments are ignored.
pub fn parse_candidates(text: &str, expand_cidr: bool) -> Vec<Candidate> {
    let mut out = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let candidate = match line.parse::<Candidate>() {
            Ok(c) => c,
            Err(e) => {
                warn!(line = idx + 1, content = %line, error = %e, "skipping malformed candidate");
                continue;
            }
        };

        if !expand_cidr {
            out.push(candidate);
            continue;
        }

        match expand(candidate) {
            Ok(expanded) => out.extend(expanded),
            Err(e) => warn!(line = idx + 1, content = %line, error = %e, "skipping candidate"),
        }
    }

    debug!(count = out.len(), "parsed candidates");
    out
}

/// Read and parse the candidate file at `path`.
pub fn load_candidates(path: &Path, expand_cidr: bool) -> Result<Vec<Candidate>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read candidate file: {}", path.display()))?;
    let candidates = parse_candidates(&text, expand_cidr);
    info!(path = %path.display(), count = candidates.len(), "loaded candidates");
    Ok(candidates)
}
