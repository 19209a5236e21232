//! HTTP client for the Prometheus range query API

use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::payload::QueryRangeResponse;
use super::{async_trait, SeriesFetcher, TimeRange};
use crate::config::DetectorConfig;
use crate::error::{ConfigError, DetectError, FetchError};
use crate::models::Series;

/// Longest error body echoed back in `FetchError::HttpStatus`
const MAX_ERROR_BODY: usize = 512;

/// Fetches series from `{base}/api/v1/query_range`
pub struct PrometheusFetcher {
    client: Client,
    endpoint: Url,
}

impl PrometheusFetcher {
    /// Create a fetcher for a normalized base URL (trailing slash)
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, DetectError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Transport)?;

        let endpoint = base_url
            .join("api/v1/query_range")
            .map_err(|e| ConfigError::InvalidBackendUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { client, endpoint })
    }

    /// Build from configuration; a missing backend URL is a configuration error
    pub fn from_config(config: &DetectorConfig) -> Result<Self, DetectError> {
        let base_url = config.require_backend_url()?;
        Self::new(base_url, config.request_timeout)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SeriesFetcher for PrometheusFetcher {
    async fn fetch(&self, query: &str, range: &TimeRange) -> Result<Series, FetchError> {
        let start = range.start.to_string();
        let end = range.end.to_string();
        let step = range.step_param();

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("query", query),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("step", step.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            // Prometheus reports query errors as JSON with a 4xx/5xx status
            if let Ok(envelope) = QueryRangeResponse::from_slice(&body) {
                if envelope.status != "success" {
                    return envelope.into_series();
                }
            }

            let mut text = String::from_utf8_lossy(&body).into_owned();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        QueryRangeResponse::from_slice(&body)?.into_series()
    }
}
