//! Log setup for the `aemport` binary.
//!
//! Logs always go to stderr. Stdout carries command output (summaries,
//! trees, reports) and must stay parseable when `--json` is set.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` when set, else everything at `level` and above.
fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the process-wide subscriber; plain text, or one JSON object per
/// line with `json`. A subscriber already installed wins.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(filter(level));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        registry.with(layer.json()).try_init().ok();
    } else {
        registry.with(layer).try_init().ok();
    }
}
