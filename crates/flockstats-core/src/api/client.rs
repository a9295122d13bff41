//! API client for the church-management REST API.
//!
//! Only the read-only statistics endpoints used by the dashboards are
//! implemented here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{ActivityPayload, AttendanceResponse, GivingResponse, SubjectId};

use super::{ApiError, StatsSource};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// A hung source delays its subject's batch by at most this long.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the statistics endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl ApiClient {
    /// Create a new API client for the given base URL
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: impl Into<Arc<str>>) {
        self.token = Some(token.into());
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, subject: &SubjectId, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, subject.api_scope(), path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("Token contains invalid characters".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.auth_headers()?)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", url, e))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    // ===== Statistics Endpoints =====

    /// Fetch donation history and totals
    pub async fn fetch_giving(&self, subject: &SubjectId) -> Result<GivingResponse, ApiError> {
        let url = self.endpoint(subject, "donations/stats");
        let response: GivingResponse = self.get(&url).await?;
        debug!(subject = %subject, records = response.history.len(), has_totals = response.stats.is_some(), "Giving stats received");
        Ok(response)
    }

    /// Fetch attended/missed session counts
    pub async fn fetch_attendance(&self, subject: &SubjectId) -> Result<AttendanceResponse, ApiError> {
        let url = self.endpoint(subject, "attendance/stats");
        self.get(&url).await
    }

    /// Fetch in-gathering (newcomer outreach) records
    pub async fn fetch_in_gathering(&self, subject: &SubjectId) -> Result<ActivityPayload, ApiError> {
        let url = self.endpoint(subject, "in-gathering");
        self.get(&url).await
    }

    /// Fetch nurturing (follow-up care) records
    pub async fn fetch_nurturing(&self, subject: &SubjectId) -> Result<ActivityPayload, ApiError> {
        let url = self.endpoint(subject, "nurturing");
        self.get(&url).await
    }
}

#[async_trait]
impl StatsSource for ApiClient {
    async fn giving(&self, subject: &SubjectId) -> Result<GivingResponse, ApiError> {
        self.fetch_giving(subject).await
    }

    async fn attendance(&self, subject: &SubjectId) -> Result<AttendanceResponse, ApiError> {
        self.fetch_attendance(subject).await
    }

    async fn in_gathering(&self, subject: &SubjectId) -> Result<ActivityPayload, ApiError> {
        self.fetch_in_gathering(subject).await
    }

    async fn nurturing(&self, subject: &SubjectId) -> Result<ActivityPayload, ApiError> {
        self.fetch_nurturing(subject).await
    }
}
