//! Log output for the gateway binary.
//!
//! The subscriber is installed before configuration is read, so its level
//! filter sits behind a reload layer and is swapped once `[logging]` is known.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

/// Outcome of [`apply_logging_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    Applied,
    /// `RUST_LOG` is set and keeps precedence over the config file.
    PinnedByEnv,
    /// [`init_tracing`] has not installed a subscriber yet.
    NotInitialized,
}

/// `RUST_LOG` directives when present and parseable, otherwise `fallback`.
fn startup_filter(rust_log: Option<String>, fallback: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}

/// Installs the global fmt subscriber. Later calls are no-ops.
pub fn init_tracing(fallback_level: &str) {
    let filter = startup_filter(std::env::var("RUST_LOG").ok(), fallback_level);
    let (filter, handle) = reload::Layer::new(filter);

    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
    {
        let _ = FILTER.set(handle);
    }
}

/// Swaps the level filter for the configured `level`.
pub fn apply_logging_level(level: &str) -> LevelChange {
    let Some(handle) = FILTER.get() else {
        return LevelChange::NotInitialized;
    };
    if std::env::var_os("RUST_LOG").is_some() {
        return LevelChange::PinnedByEnv;
    }

    match handle.reload(EnvFilter::new(level)) {
        Ok(()) => {
            tracing::debug!(level, "Log level applied");
            LevelChange::Applied
        }
        Err(e) => {
            tracing::warn!(level, error = %e, "Failed to apply log level");
            LevelChange::NotInitialized
        }
    }
}
