//! Record fetch and id-range discovery over HTTP.
//!
//! The [`Fetcher`] trait is what the driver loop consumes; tests script
//! it, production uses [`HttpFetcher`]. Status codes collapse into four
//! outcomes the loop can act on: a record, a permanent miss, a rejected
//! request, or a transient outage worth retrying.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use crate::model::RawRecord;

/// What a fetch attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The API returned a record for this id.
    Record(RawRecord),
    /// No record exists for this id; skip it for good.
    NotFound,
    /// The API rejected the request; skip the id, do not retry.
    InvalidRequest,
    /// The API (or the network) is temporarily unavailable; retry the
    /// same id without advancing.
    ServiceUnavailable,
}

/// Source of records and of the id range bound.
pub trait Fetcher: Send + Sync {
    /// Fetch the record for one id.
    fn fetch(&self, id: u64) -> impl std::future::Future<Output = Result<FetchOutcome>> + Send;

    /// Resolve the end of the id range: current maximum known id + 1.
    ///
    /// Called once per deployment, when no cursor carries a `maxId` yet.
    fn discover_max_id(&self) -> impl std::future::Future<Output = Result<u64>> + Send;
}

/// HTTP fetcher: GET `{api}/{id}` per record.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    discovery: Option<DiscoveryConfig>,
}

impl HttpFetcher {
    /// Create a fetcher for the configured API.
    #[must_use]
    pub fn new(api: &str, discovery: Option<DiscoveryConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: api.trim_end_matches('/').to_string(),
            discovery,
        }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, id: u64) -> Result<FetchOutcome> {
        let url = format!("{}/{id}", self.base_url);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("id {id}: transport error, treating as unavailable: {e}");
                return Ok(FetchOutcome::ServiceUnavailable);
            }
        };

        match response.status().as_u16() {
            200 | 201 => {
                let value: Value = response
                    .json()
                    .await
                    .map_err(|e| Error::Fetch(format!("id {id}: response is not JSON: {e}")))?;
                match value {
                    Value::Object(record) => {
                        debug!("id {id}: record found");
                        Ok(FetchOutcome::Record(record))
                    }
                    other => Err(Error::Fetch(format!(
                        "id {id}: expected a JSON object, got {}",
                        json_kind(&other)
                    ))),
                }
            }
            404 => {
                debug!("id {id}: not found");
                Ok(FetchOutcome::NotFound)
            }
            400 | 401 | 403 | 405 | 409 => {
                warn!("id {id}: request rejected ({})", response.status());
                Ok(FetchOutcome::InvalidRequest)
            }
            429 | 500 | 503 => {
                warn!("id {id}: service unavailable ({})", response.status());
                Ok(FetchOutcome::ServiceUnavailable)
            }
            other => {
                warn!("id {id}: unexpected status {other}, skipping");
                Ok(FetchOutcome::InvalidRequest)
            }
        }
    }

    async fn discover_max_id(&self) -> Result<u64> {
        let Some(discovery) = &self.discovery else {
            return Err(Error::Config(
                "no `discovery` endpoint configured; pass --max or set one".to_string(),
            ));
        };

        let response = self
            .client
            .get(&discovery.url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("range discovery failed: {e}")))?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::Fetch(format!("range discovery response is not JSON: {e}")))?;

        let raw = value.pointer(&discovery.pointer).ok_or_else(|| {
            Error::Fetch(format!(
                "range discovery pointer `{}` not found in response",
                discovery.pointer
            ))
        })?;
        let max = raw
            .as_u64()
            .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| {
                Error::Fetch(format!(
                    "range discovery value at `{}` is not an id: {raw}",
                    discovery.pointer
                ))
            })?;

        debug!("range discovery: max known id {max}");
        Ok(max + 1)
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let fetcher = HttpFetcher::new("https://api.example.com/anime/", None);
        assert_eq!(fetcher.base_url, "https://api.example.com/anime");
    }

    #[tokio::test]
    async fn test_discovery_requires_config() {
        let fetcher = HttpFetcher::new("https://api.example.com/anime", None);
        assert!(matches!(
            fetcher.discover_max_id().await,
            Err(Error::Config(_))
        ));
    }
}
