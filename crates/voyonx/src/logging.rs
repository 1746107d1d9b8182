//! Logging initialization
//!
//! `RUST_LOG` wins when set. Otherwise debug builds log at `debug` with the
//! chattier dependencies turned down, and release builds log at `info`.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const DEBUG_FILTER: &str = "debug,eframe=warn,egui=warn,walkers=info,reqwest=info,hyper_util=info,wgpu_core=warn,wgpu_hal=warn,naga=warn";
const RELEASE_FILTER: &str = "info,eframe=warn,egui=warn";

pub fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        DEBUG_FILTER
    } else {
        RELEASE_FILTER
    }
}

/// Install the global subscriber. Safe to repeat; later calls do nothing.
pub fn setup_logging() {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(default_filter()), false),
    };

    let fmt_layer = fmt::layer().with_filter(filter);
    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        return;
    }

    if from_env {
        tracing::info!("Logging initialized from RUST_LOG");
    } else {
        tracing::info!("RUST_LOG not set, using default filter: {}", default_filter());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_parse() {
        assert!(EnvFilter::try_new(DEBUG_FILTER).is_ok());
        assert!(EnvFilter::try_new(RELEASE_FILTER).is_ok());
    }

    #[test]
    fn test_setup_twice_is_harmless() {
        setup_logging();
        setup_logging();
        tracing::debug!("still logging");
    }
}
