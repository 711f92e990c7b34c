//! Portal fragment client.
//!
//! This module is the network collaborator of the page behaviors. It focuses on:
//!
//! - The [`FragmentFetcher`] seam the Region Synchronizer calls through
//! - Constructing an HTTP client tagged as a script-driven request
//!   (`X-Requested-With: XMLHttpRequest`) so the server answers with a
//!   region fragment rather than a full page
//! - Validating the page location before any request is issued
//!
//! The primary entry point is [`PortalClient`].
//!
//! # Example
//!
//! ```ignore
//! use portal_api::{FragmentFetcher, PortalClient};
//! use std::time::Duration;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let client = PortalClient::new(Duration::from_secs(30))?;
//!     let url = url::Url::parse("http://localhost:8000/portal/?target=request&page=2")?;
//!     let response = client.fetch(&url).await?;
//!     println!("{} {}", response.status, response.body);
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, header};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Header the server inspects to tell fragment requests from navigations.
pub const REQUESTED_WITH_HEADER: &str = "x-requested-with";

/// Value sent in [`REQUESTED_WITH_HEADER`].
pub const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";

/// Raw result of a fragment request, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentResponse {
    pub status: u16,
    pub body: String,
}

impl FragmentResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failures. Non-2xx responses are not errors at this layer.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Fetches server-rendered fragments.
///
/// Implementations run on the page's single-threaded event loop, so futures
/// need not be `Send`.
#[async_trait(?Send)]
pub trait FragmentFetcher {
    async fn fetch(&self, url: &Url) -> Result<FragmentResponse, FetchError>;
}

/// Thin wrapper around a configured `reqwest::Client` for fragment requests.
#[derive(Debug, Clone)]
pub struct PortalClient {
    pub http: Client,
    pub user_agent: String,
}

impl PortalClient {
    /// Build a client with the fragment request headers preset.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::HeaderName::from_static(REQUESTED_WITH_HEADER),
            header::HeaderValue::from_static(REQUESTED_WITH_VALUE),
        );
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("text/html"));

        let http = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(connect_timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            user_agent: format!("portal-client/0.1; {}", std::env::consts::OS),
        })
    }
}

#[async_trait(?Send)]
impl FragmentFetcher for PortalClient {
    async fn fetch(&self, url: &Url) -> Result<FragmentResponse, FetchError> {
        debug!(%url, "requesting fragment");
        let response = self
            .http
            .get(url.clone())
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|error| FetchError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|error| FetchError::Body(error.to_string()))?;
        Ok(FragmentResponse { status, body })
    }
}

/// Validate that a page location can be used for fragment requests.
///
/// Rules:
/// - scheme must be `http` or `https`
/// - a host is required
pub fn validate_page_url(url: &Url) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!(
            "page URL must use http or https; got '{}://'",
            url.scheme()
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(anyhow!("page URL '{}' must include a host", url));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_covers_the_2xx_range_only() {
        assert!(FragmentResponse::new(200, "").is_success());
        assert!(FragmentResponse::new(204, "").is_success());
        assert!(!FragmentResponse::new(304, "").is_success());
        assert!(!FragmentResponse::new(500, "boom").is_success());
    }

    #[test]
    fn page_url_validation() {
        assert!(validate_page_url(&Url::parse("http://localhost:8000/portal/").unwrap()).is_ok());
        assert!(validate_page_url(&Url::parse("https://portal.example.com/").unwrap()).is_ok());
        assert!(validate_page_url(&Url::parse("ftp://portal.example.com/").unwrap()).is_err());
        assert!(validate_page_url(&Url::parse("file:///tmp/page.html").unwrap()).is_err());
    }

    #[test]
    fn client_builds_with_fragment_headers() {
        let client = PortalClient::new(Duration::from_secs(5)).unwrap();
        assert!(client.user_agent.starts_with("portal-client/"));
    }
}
