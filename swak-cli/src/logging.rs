//! Logging initialization for the swak binary.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `SwakConfig`, the `-v` count and `--log-level`. `RUST_LOG` wins over all
//! of them. Logs go to stderr so pipeline output on stdout stays clean.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use swak_core::config::GeneralConfig;

const LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

fn rank(level: &str) -> usize {
    LEVELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(level))
        .unwrap_or(2)
}

/// Resolve the effective level.
///
/// `--log-level` wins. Otherwise `-v` raises the configured level to `info`
/// and `-vv` to `debug`, but never lowers it.
pub fn effective_level(configured: &str, verbose: u8, override_level: Option<&str>) -> String {
    if let Some(level) = override_level {
        return level.to_ascii_lowercase();
    }
    let raised = match verbose {
        0 => return configured.to_ascii_lowercase(),
        1 => "info",
        _ => "debug",
    };
    if rank(raised) > rank(configured) {
        raised.to_owned()
    } else {
        configured.to_ascii_lowercase()
    }
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Human-readable colored output
pub fn init_tracing(config: &GeneralConfig, level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)
                })?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)
                })?;
        }
        _ => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                config.log_format
            ));
        }
    }

    Ok(())
}
