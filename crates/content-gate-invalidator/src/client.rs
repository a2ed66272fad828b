//! HTTP client for the revalidation endpoint.
//!
//! Handles request construction, bearer authentication and mapping of
//! transport and status failures onto `InvalidationError`.

use std::{fmt, time::Duration};

use content_gate_core::{
    CacheInvalidator, ChangeType, DocumentId, GateError, InvalidationError, Result,
};
use reqwest::{StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};

/// Configuration for the HTTP invalidator.
#[derive(Clone)]
pub struct InvalidatorConfig {
    /// Revalidation endpoint receiving one POST per change.
    pub url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Optional bearer token sent in `Authorization`.
    pub token: Option<SecretString>,
    /// User agent string for requests.
    pub user_agent: String,
}

impl InvalidatorConfig {
    /// Configuration for `url` with default timeout and no token.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(5),
            token: None,
            user_agent: concat!("content-gate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl fmt::Debug for InvalidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidatorConfig")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// JSON body posted for each change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationRequest<'a> {
    /// Changed document
    pub document_id: &'a DocumentId,
    /// What happened to it
    pub change_type: ChangeType,
}

/// Cache invalidator backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpInvalidator {
    client: reqwest::Client,
    url: Url,
    token: Option<SecretString>,
    timeout: Duration,
}

impl HttpInvalidator {
    /// Creates an invalidator.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Configuration` if the URL is not an absolute
    /// http(s) URL, the timeout is zero, or the HTTP client cannot be built.
    pub fn new(config: InvalidatorConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| GateError::Configuration(format!("invalid invalidation URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GateError::Configuration(format!(
                "invalidation URL must use http or https, got {}",
                url.scheme()
            )));
        }
        if config.timeout.is_zero() {
            return Err(GateError::Configuration("invalidation timeout must be greater than 0".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GateError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, url, token: config.token, timeout: config.timeout })
    }

    /// Endpoint this invalidator posts to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn timeout_error(&self) -> InvalidationError {
        InvalidationError::Timeout {
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[async_trait::async_trait]
impl CacheInvalidator for HttpInvalidator {
    async fn invalidate(
        &self,
        document_id: &DocumentId,
        change_type: ChangeType,
    ) -> std::result::Result<(), InvalidationError> {
        let span = info_span!(
            "cache_invalidation",
            document_id = %document_id,
            change_type = %change_type,
            url = %self.url
        );

        async move {
            let body = InvalidationRequest { document_id, change_type };
            let mut request = self.client.post(self.url.clone()).json(&body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token.expose_secret());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    warn!("invalidation request timed out");
                    return Err(self.timeout_error());
                },
                Err(e) if e.is_connect() => {
                    warn!(error = %e, "invalidation endpoint unreachable");
                    return Err(InvalidationError::Network(format!("connection failed: {e}")));
                },
                Err(e) => {
                    warn!(error = %e, "invalidation request failed");
                    return Err(InvalidationError::Network(e.to_string()));
                },
            };

            let status = response.status();
            if status.is_success() {
                debug!(status = status.as_u16(), "cache invalidated");
                return Ok(());
            }

            warn!(status = status.as_u16(), "invalidation endpoint rejected change");
            Err(rejected(status))
        }
        .instrument(span)
        .await
    }
}

fn rejected(status: StatusCode) -> InvalidationError {
    InvalidationError::Rejected { status: status.as_u16() }
}
