//! Open-file limit handling. Every in-flight probe holds a socket, so large
//! concurrency settings need more descriptors than the usual soft limit.

use tracing::{debug, info, warn};

/// Soft `RLIMIT_NOFILE` requested before probing.
pub const DESIRED_OPEN_FILES: u64 = 10_000;

/// Raise the soft open-file limit towards `target`, capped by the hard limit.
/// Returns the soft limit in effect afterwards.
#[cfg(unix)]
pub fn raise_open_file_limit(target: u64) -> std::io::Result<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let ret = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let wanted = (target as libc::rlim_t).min(limit.rlim_max);
    if limit.rlim_cur >= wanted {
        return Ok(limit.rlim_cur as u64);
    }

    limit.rlim_cur = wanted;
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(wanted as u64)
}

#[cfg(not(unix))]
pub fn raise_open_file_limit(_target: u64) -> std::io::Result<u64> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "open-file limits are not adjustable on this platform",
    ))
}

/// Best-effort wrapper: failures are logged, never fatal.
pub fn raise_or_warn(target: u64) {
    match raise_open_file_limit(target) {
        Ok(now) if now >= target => info!(limit = now, "open-file limit raised"),
        Ok(now) => debug!(limit = now, target, "open-file limit capped by hard limit"),
        Err(e) => warn!(error = %e, "could not raise open-file limit"),
    }
}
