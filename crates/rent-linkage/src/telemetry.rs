use crate::config::TelemetryConfig;
use metrics::{describe_counter, Unit};
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Index repository lookups by `index_type`, `operation`, and `outcome`
/// (`hit`, `missing`, `fetch_failed`).
pub const INDEX_LOOKUPS_TOTAL: &str = "rent_linkage_index_lookups_total";
/// Batch items by `outcome` (`computed`, `degraded`, `rejected`).
pub const BATCH_ITEMS_TOTAL: &str = "rent_linkage_batch_items_total";
pub const LOOKUP_TIMEOUTS_TOTAL: &str = "rent_linkage_lookup_timeouts_total";

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log level/filter '{value}': unable to build EnvFilter")
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Install the global subscriber on stderr. `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::EnvFilter {
                value: config.log_level.clone(),
                source,
            })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// Register help text for the engine's counters with whatever recorder is installed.
pub fn describe_metrics() {
    describe_counter!(
        INDEX_LOOKUPS_TOTAL,
        Unit::Count,
        "Index repository lookups, split by whether a figure was found, missing, or failed to fetch"
    );
    describe_counter!(
        BATCH_ITEMS_TOTAL,
        Unit::Count,
        "Linkage batch items by outcome"
    );
    describe_counter!(
        LOOKUP_TIMEOUTS_TOTAL,
        Unit::Count,
        "Index lookups abandoned after the configured deadline"
    );
}
