//! Diagnostics Logging
//!
//! All diagnostics go through `tracing` to stderr so stdout only carries the
//! verdict (or pure NDJSON with `--format json`). The filter comes from the
//! `Z_LOG` target list (e.g. `zharness=trace`) or, when unset, from
//! `--verbose`.

use std::sync::Once;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub const LOG_ENV: &str = "Z_LOG";

static INIT_LOGGER: Once = Once::new();

fn default_targets(verbose: bool) -> Targets {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    Targets::new().with_default(level)
}

/// Parse a `Z_LOG` value; `None` when empty or malformed.
fn parse_targets(spec: &str) -> Option<Targets> {
    if spec.trim().is_empty() {
        return None;
    }
    spec.parse().ok()
}

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    INIT_LOGGER.call_once(|| {
        let spec = std::env::var(LOG_ENV).unwrap_or_default();
        let parsed = parse_targets(&spec);
        let invalid = parsed.is_none() && !spec.trim().is_empty();
        let targets = parsed.unwrap_or_else(|| default_targets(verbose));

        let layer = tracing_subscriber::fmt::layer()
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(targets);

        tracing_subscriber::registry().with(layer).init();

        if invalid {
            tracing::warn!("ignoring unparseable {}={}", LOG_ENV, spec);
        }
    });
}
