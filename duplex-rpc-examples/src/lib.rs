//! Demo services for duplex-rpc.
//!
//! [`calc`] and [`greet`] each expose all four call shapes over a
//! [`LocalTransport`](duplex_rpc::LocalTransport). The binaries under
//! `src/bin` drive them from the command line.

use std::time::Duration;

pub mod calc;
pub mod greet;

/// Returns the pacing interval from the `PACE_MS` env var, if set.
///
/// Streaming demos sleep this long between messages. Unset or `0` means no
/// pacing.
///
/// # Example
///
/// ```ignore
/// let service = duplex_rpc_examples::calc::CalcService::new()
///     .pace(duplex_rpc_examples::pace_from_env()?);
/// ```
pub fn pace_from_env() -> anyhow::Result<Option<Duration>> {
    let Ok(raw) = std::env::var("PACE_MS") else {
        return Ok(None);
    };
    let millis: u64 = raw
        .trim()
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid PACE_MS env var {raw:?}: {err}"))?;
    Ok((millis > 0).then(|| Duration::from_millis(millis)))
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
