use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::infra::{CacheError, HistoryError, SourceError};
use crate::telemetry::TelemetryError;
use crate::util::persistence::PersistError;

/// Everything that can abort a CLI command. Source failures during a search
/// never end up here; they are reported through the aggregation instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("offer source setup failed: {0}")]
    Source(#[from] SourceError),
    #[error("offer cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("search history error: {0}")]
    History(#[from] HistoryError),
    #[error("agent profile error: {0}")]
    Persist(#[from] PersistError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}
