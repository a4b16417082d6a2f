//! Semantic Scholar Graph API client

use super::MetadataFetcher;
use crate::config::ScholarConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::Publication;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Field set requested for every publication
pub const PAPER_FIELDS: &str = "title,authors,references,abstract,openAccessPdf,externalIds";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Publication>,
}

/// HTTP client for the Graph API
pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl SemanticScholarClient {
    /// Create a client from configuration
    pub fn new(config: &ScholarConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("citetree/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn paper_url(&self, id: &str) -> String {
        format!("{}/paper/{}", self.base_url, id)
    }

    pub fn search_url(&self) -> String {
        format!("{}/paper/search", self.base_url)
    }

    /// GET with retry on transient failures
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_interval(Duration::from_secs(5))
            .with_max_elapsed_time(None)
            .build();

        let max_retries = self.max_retries;
        let mut attempt = 0u32;

        backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                self.send_once::<T>(url, query, subject).await.map_err(|e| {
                    if Self::is_retryable(&e) && current <= max_retries {
                        warn!(
                            attempt = current,
                            max_retries,
                            error = %e,
                            "Upstream request failed, retrying"
                        );
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<T> {
        let mut request = self.client.get(url).query(query);
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(AppError::PaperNotFound {
                id: subject.to_string(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::UpstreamRateLimited);
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                message: format!("API error {}: {}", status, body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::InvalidFormat {
                message: format!("upstream rejected '{}' with {}: {}", subject, status, body),
            });
        }

        response.json::<T>().await.map_err(Into::into)
    }

    fn is_retryable(err: &AppError) -> bool {
        matches!(
            err,
            AppError::UpstreamRateLimited | AppError::Upstream { .. } | AppError::HttpClient(_)
        ) && err.is_transient()
    }
}

#[async_trait]
impl MetadataFetcher for SemanticScholarClient {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, id: &str) -> Result<Publication> {
        let start = Instant::now();
        let url = self.paper_url(id);
        let result = self
            .get_json::<Publication>(&url, &[("fields", PAPER_FIELDS.to_string())], id)
            .await;

        metrics::record_upstream(start.elapsed().as_secs_f64(), "fetch", result.is_ok());
        debug!(ok = result.is_ok(), "Upstream fetch finished");
        result
    }

    #[instrument(skip(self), level = "debug")]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Publication>> {
        let start = Instant::now();
        let url = self.search_url();
        let params = [
            ("query", query.to_string()),
            ("fields", PAPER_FIELDS.to_string()),
            ("limit", limit.to_string()),
        ];
        let result = self
            .get_json::<SearchResponse>(&url, &params, query)
            .await
            .map(|r| r.data);

        metrics::record_upstream(start.elapsed().as_secs_f64(), "search", result.is_ok());
        result
    }
}
