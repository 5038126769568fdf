//! Offer sources: freight exchange HTTP clients and file-backed replays.
//!
//! - `ExchangeClient` talks to a JSON search endpoint (TransEU, TIMOCOM proxy).
//! - `FileSource` replays a saved offer dump, handy offline and in tests.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::{offers_from_json, Offer, SearchQuery, SourceName};
use crate::util::version::user_agent;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error: {0}")]
    Api(String),
    #[error("unexpected payload: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Anything that can answer an offer search.
#[async_trait]
pub trait OfferSource: Send + Sync {
    fn name(&self) -> &SourceName;

    async fn fetch_offers(&self, query: &SearchQuery) -> Result<Vec<Offer>, SourceError>;
}

#[derive(Clone)]
pub struct ExchangeClient {
    name: SourceName,
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl ExchangeClient {
    pub fn new(name: impl Into<SourceName>, endpoint: &str) -> Result<Self, SourceError> {
        let endpoint = Url::parse(endpoint)?;
        let http = Client::builder().user_agent(user_agent()).build()?;
        Ok(Self {
            name: name.into(),
            http,
            endpoint,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn search_url(&self, query: &SearchQuery) -> Url {
        let mut url = self.endpoint.clone();
        let pairs = query.query_pairs();
        if !pairs.is_empty() {
            let mut serializer = url.query_pairs_mut();
            for (key, value) in pairs {
                serializer.append_pair(key, &value);
            }
        }
        url
    }
}

#[async_trait]
impl OfferSource for ExchangeClient {
    fn name(&self) -> &SourceName {
        &self.name
    }

    async fn fetch_offers(&self, query: &SearchQuery) -> Result<Vec<Offer>, SourceError> {
        let url = self.search_url(query);
        debug!(source = %self.name, %url, "requesting offers");

        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let payload: Value = response.json().await?;
        parse_offer_payload(&self.name, payload)
    }
}

/// Offers stored as JSON on disk.
#[derive(Clone, Debug)]
pub struct FileSource {
    name: SourceName,
    path: PathBuf,
}

impl FileSource {
    pub fn new(name: impl Into<SourceName>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl OfferSource for FileSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    async fn fetch_offers(&self, _query: &SearchQuery) -> Result<Vec<Offer>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let payload: Value =
            serde_json::from_str(&content).map_err(|e| SourceError::Decode(e.to_string()))?;
        parse_offer_payload(&self.name, payload)
    }
}

/// Unwraps the shapes exchanges answer with: a bare array, a
/// `{status, data, message}` envelope, or an object holding the list under
/// `data`, `offers` or `results`.
pub fn parse_offer_payload(source: &SourceName, payload: Value) -> Result<Vec<Offer>, SourceError> {
    let list = match payload {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut fields) => {
            if let Some(status) = fields.get("status").and_then(Value::as_str) {
                if !status.eq_ignore_ascii_case("ok") && !status.eq_ignore_ascii_case("success") {
                    let message = fields
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or(status)
                        .to_string();
                    return Err(SourceError::Api(message));
                }
            }
            ["data", "offers", "results"]
                .iter()
                .find_map(|key| fields.remove(*key).filter(Value::is_array))
                .ok_or_else(|| SourceError::Decode("response holds no offer list".into()))?
        }
        other => {
            return Err(SourceError::Decode(format!(
                "expected an offer list, got {}",
                json_kind(&other)
            )))
        }
    };

    let parsed = offers_from_json(list);
    if parsed.malformed > 0 {
        debug!(
            source = %source,
            skipped = parsed.malformed,
            "skipped undecodable offer entries"
        );
    }
    Ok(parsed.offers)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
