//! HTTP client for the catalog provider.
//!
//! Every call runs under a bounded request timeout so a hung provider cannot
//! stall a rule evaluation worker. Transient failures (5xx, 429, connect and
//! timeout errors) are retried with exponential backoff.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::models::{Class, Lesson, Match};
use crate::params::{SearchClassesParams, SearchLessonsParams, SearchMatchesParams};

pub const BASE_URL: &str = "https://api.playtomic.io/v1";

/// Deadline for a single provider call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = "palert/0.1";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Client for the catalog's per-category search endpoints.
#[derive(Debug)]
pub struct PlaytomicClient {
    client: reqwest::Client,
    base_url: String,
    backoff: BackoffPolicy,
}

impl PlaytomicClient {
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(BASE_URL)
    }

    /// Client against an alternate base URL, used by tests and staging.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            backoff: BackoffPolicy::default(),
        })
    }

    pub async fn search_matches(
        &self,
        params: &SearchMatchesParams,
    ) -> Result<Vec<Match>, ProviderError> {
        self.send("/matches", &params.to_query()).await
    }

    pub async fn search_classes(
        &self,
        params: &SearchClassesParams,
    ) -> Result<Vec<Class>, ProviderError> {
        self.send("/classes", &params.to_query()).await
    }

    pub async fn search_lessons(
        &self,
        params: &SearchLessonsParams,
    ) -> Result<Vec<Lesson>, ProviderError> {
        self.send("/lessons", &params.to_query()).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let response = self.client.get(&url).query(query).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        return Ok(resp.json::<T>().await?);
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        debug!(endpoint, status = status.as_u16(), attempt, "retrying provider call");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(ProviderError::Status {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(ProviderError::Request(err));
                }
            }
        }

        Err(ProviderError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}
