//! Runtime configuration read from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::infra::aggregator::DEFAULT_SOURCE_TIMEOUT;
use crate::infra::cache::{OfferCache, DEFAULT_MAX_CACHED_OFFERS, OFFER_CACHE_TTL};
use crate::infra::history::SearchHistory;

/// Top-level configuration for the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub sources: Vec<SourceConfig>,
    pub source_timeout: Duration,
    pub cache: CacheConfig,
    pub history_path: PathBuf,
}

/// One exchange endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub ttl: Duration,
    pub max_offers: usize,
}

/// Tracing controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SCANNER_SOURCES entry '{0}' must look like name=url")]
    InvalidSource(String),
    #[error("SCANNER_SOURCES endpoint for '{name}' is not a valid URL: '{endpoint}'")]
    InvalidEndpoint { name: String, endpoint: String },
    #[error("SCANNER_SOURCES lists '{0}' more than once")]
    DuplicateSource(String),
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let log_level = get("SCANNER_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let sources = match get("SCANNER_SOURCES") {
            Some(raw) => parse_sources(&raw, &get)?,
            None => Vec::new(),
        };

        let source_timeout = match get("SCANNER_SOURCE_TIMEOUT_MS") {
            Some(raw) => {
                Duration::from_millis(parse_positive("SCANNER_SOURCE_TIMEOUT_MS", &raw)?)
            }
            None => DEFAULT_SOURCE_TIMEOUT,
        };

        let cache_ttl = match get("SCANNER_CACHE_TTL_HOURS") {
            Some(raw) => {
                Duration::from_secs(parse_positive("SCANNER_CACHE_TTL_HOURS", &raw)? * 3600)
            }
            None => OFFER_CACHE_TTL,
        };

        let max_offers = match get("SCANNER_CACHE_MAX_OFFERS") {
            Some(raw) => parse_positive("SCANNER_CACHE_MAX_OFFERS", &raw)? as usize,
            None => DEFAULT_MAX_CACHED_OFFERS,
        };

        Ok(Self {
            telemetry: TelemetryConfig { log_level },
            sources,
            source_timeout,
            cache: CacheConfig {
                path: get("SCANNER_CACHE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(OfferCache::default_path),
                ttl: cache_ttl,
                max_offers,
            },
            history_path: get("SCANNER_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(SearchHistory::default_path),
        })
    }
}

fn parse_sources<G>(raw: &str, get: &G) -> Result<Vec<SourceConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let mut sources: Vec<SourceConfig> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, endpoint) = entry
            .split_once('=')
            .map(|(n, e)| (n.trim(), e.trim()))
            .filter(|(n, e)| !n.is_empty() && !e.is_empty())
            .ok_or_else(|| ConfigError::InvalidSource(entry.to_string()))?;

        let name = name.to_ascii_lowercase();
        if sources.iter().any(|s| s.name == name) {
            return Err(ConfigError::DuplicateSource(name));
        }

        if Url::parse(endpoint).is_err() {
            return Err(ConfigError::InvalidEndpoint {
                name,
                endpoint: endpoint.to_string(),
            });
        }

        let key_var = format!("SCANNER_API_KEY_{}", env_suffix(&name));
        sources.push(SourceConfig {
            api_key: get(&key_var),
            name,
            endpoint: endpoint.to_string(),
        });
    }
    Ok(sources)
}

/// `trans.eu` -> `TRANS_EU`
fn env_suffix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        })
}
