//! Typed HTTP client for the crawler backend's REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use rfpscan_core::{
    CrawlSession, CrawlSource, DashboardStats, Opportunity, OpportunityQuery, OpportunityStatus,
    Page, SessionStatus, Timestamp,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub use reqwest::Url;

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid backend url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("backend returned HTTP {status} for {url}{}", detail_suffix(.detail))]
    HttpStatus {
        status: u16,
        url: String,
        detail: Option<String>,
    },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl ApiError {
    /// Transport failures and 5xx responses: the backend itself is down or broken.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::InvalidUrl { .. } | Self::Decode { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Operator-facing message for the dashboard banner.
    pub fn banner(&self, backend_url: &str) -> String {
        match self {
            Self::HttpStatus {
                status,
                detail: Some(detail),
                ..
            } if *status < 500 => format!("The backend rejected the request: {detail}"),
            _ if self.is_unavailable() => format!(
                "Unable to reach the backend API at {backend_url}. Check that the backend is running and reachable, then refresh."
            ),
            _ => format!(
                "The backend API at {backend_url} returned an unexpected response ({self}). Check the backend version and logs."
            ),
        }
    }
}

/// Body of `POST /crawl/trigger/{source_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub session_id: Uuid,
    pub source_id: Uuid,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl TriggerResponse {
    /// Stand-in session until the next refresh returns the backend's record.
    pub fn optimistic_session(&self, triggered_at: DateTime<Utc>) -> CrawlSession {
        CrawlSession {
            id: self.session_id,
            source_id: self.source_id,
            status: self.status.clone(),
            started_at: None,
            completed_at: None,
            created_at: Timestamp::from_datetime(triggered_at),
            pages_crawled: 0,
            opportunities_found: 0,
            opportunities_new: 0,
            opportunities_updated: 0,
            documents_downloaded: 0,
            errors_count: 0,
            last_error_message: None,
            triggered_by: Some("api".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    pub message: String,
}

fn default_success() -> bool {
    true
}

/// The calls a dashboard refresh cycle needs from the backend.
#[async_trait]
pub trait DashboardBackend: Send + Sync {
    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError>;

    async fn list_opportunities(
        &self,
        query: &OpportunityQuery,
    ) -> Result<Page<Opportunity>, ApiError>;

    /// Most recent first.
    async fn list_sessions(&self, page: u32, page_size: u32)
        -> Result<Page<CrawlSession>, ApiError>;

    async fn list_sources(&self, page: u32, page_size: u32) -> Result<Page<CrawlSource>, ApiError>;

    /// Most recent first, restricted to one source.
    async fn list_sessions_for_source(
        &self,
        source_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<Page<CrawlSession>, ApiError>;

    async fn trigger_crawl(&self, source_id: Uuid) -> Result<TriggerResponse, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_root: Url,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let api_root = api_root(&config.base_url, &config.api_prefix)?;
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().map_err(|source| ApiError::Request {
            url: api_root.to_string(),
            source,
        })?;
        Ok(Self { client, api_root })
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.api_root
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::InvalidUrl {
                url: format!("{}{}", self.api_root, path),
                reason: err.to_string(),
            })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let span = info_span!("backend_call", %method, %url);
        let request = build(self.client.request(method, url.clone()));
        async move {
            let resp = request.send().await.map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;
            let status = resp.status();
            let body = resp.bytes().await.map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;
            debug!(status = status.as_u16(), bytes = body.len(), "backend responded");
            if !status.is_success() {
                return Err(ApiError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                    detail: error_detail(status, &body),
                });
            }
            serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
                url: url.to_string(),
                source,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<CrawlSession, ApiError> {
        self.call(Method::GET, &format!("crawl/sessions/{session_id}"), |r| r)
            .await
    }

    pub async fn cancel_session(&self, session_id: Uuid) -> Result<SuccessResponse, ApiError> {
        self.call(
            Method::POST,
            &format!("crawl/sessions/{session_id}/cancel"),
            |r| r,
        )
        .await
    }

    pub async fn get_opportunity(&self, opportunity_id: Uuid) -> Result<Opportunity, ApiError> {
        self.call(Method::GET, &format!("opportunities/{opportunity_id}"), |r| r)
            .await
    }

    /// Operator review action; the backend owns the transition rules.
    pub async fn update_opportunity_status(
        &self,
        opportunity_id: Uuid,
        status: &OpportunityStatus,
    ) -> Result<Opportunity, ApiError> {
        let body = serde_json::json!({ "status": status.as_str() });
        self.call(
            Method::PATCH,
            &format!("opportunities/{opportunity_id}"),
            |r| r.json(&body),
        )
        .await
    }
}

#[async_trait]
impl DashboardBackend for ApiClient {
    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.call(Method::GET, "dashboard/stats", |r| r).await
    }

    async fn list_opportunities(
        &self,
        query: &OpportunityQuery,
    ) -> Result<Page<Opportunity>, ApiError> {
        let pairs = query.to_query_pairs();
        self.call(Method::GET, "opportunities", |r| r.query(&pairs))
            .await
    }

    async fn list_sessions(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Page<CrawlSession>, ApiError> {
        self.call(Method::GET, "crawl/sessions", |r| {
            r.query(&page_params(page, page_size))
        })
        .await
    }

    async fn list_sources(&self, page: u32, page_size: u32) -> Result<Page<CrawlSource>, ApiError> {
        self.call(Method::GET, "sources", |r| r.query(&page_params(page, page_size)))
            .await
    }

    async fn list_sessions_for_source(
        &self,
        source_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> Result<Page<CrawlSession>, ApiError> {
        self.call(Method::GET, "crawl/sessions", |r| {
            r.query(&page_params(page, page_size))
                .query(&[("source_id", source_id.to_string())])
        })
        .await
    }

    async fn trigger_crawl(&self, source_id: Uuid) -> Result<TriggerResponse, ApiError> {
        self.call(Method::POST, &format!("crawl/trigger/{source_id}"), |r| r)
            .await
    }
}

fn page_params(page: u32, page_size: u32) -> [(&'static str, String); 2] {
    [
        ("page", page.max(1).to_string()),
        ("page_size", page_size.clamp(1, rfpscan_core::query::MAX_PAGE_SIZE).to_string()),
    ]
}

/// `base_url` + `api_prefix`, always ending in `/` so relative joins append.
fn api_root(base_url: &str, api_prefix: &str) -> Result<Url, ApiError> {
    let prefix = api_prefix.trim_matches('/');
    let raw = if prefix.is_empty() {
        format!("{}/", base_url.trim_end_matches('/'))
    } else {
        format!("{}/{}/", base_url.trim_end_matches('/'), prefix)
    };
    let url = Url::parse(&raw).map_err(|err| ApiError::InvalidUrl {
        url: raw.clone(),
        reason: err.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::InvalidUrl {
            url: raw,
            reason: "expected an http(s) base url".to_string(),
        });
    }
    Ok(url)
}

/// Pulls the human message out of the backend's error envelopes:
/// `{"error": {"message": ..}}`, `{"detail": ".."}` or `{"detail": [{"msg": ..}]}`.
fn error_detail(status: StatusCode, body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let message = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("detail").and_then(|v| v.as_str()))
        .or_else(|| value.pointer("/detail/0/msg").and_then(|v| v.as_str()))?;
    let message = message.trim();
    if message.is_empty() {
        debug!(status = status.as_u16(), "backend error body had an empty message");
        return None;
    }
    Some(message.to_string())
}

/// Host part of a URL for compact display; the raw input when it does not parse.
pub fn display_host(raw: &str) -> String {
    Url::parse(raw.trim())
        .ok()
        .and_then(|url| url.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| raw.to_string())
}
