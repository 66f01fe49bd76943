//! REST API client for the compound evolver web service.
//!
//! Wraps the three endpoints the client needs (job submission, progress
//! polling, termination) using [`reqwest`]. The server keeps the run in
//! the HTTP session, so the underlying client stores cookies: every call
//! made through one [`EvolverApi`] talks about the same run.

use std::sync::Arc;

use async_trait::async_trait;
use evo_core::snapshot::ProgressSnapshot;
use evo_core::types::JobHandle;

use crate::config::EngineConfig;
use crate::form::JobForm;
use crate::messages::parse_progress;
use crate::transport::{JobTransport, TransportError};

/// Multipart job submission.
pub const SUBMIT_PATH: &str = "evolve.do";
/// Incremental progress for the session's run.
pub const PROGRESS_PATH: &str = "progress.update";
/// Ask the session's run to stop after the current generation.
pub const TERMINATE_PATH: &str = "evolution.terminate";

/// Session cookie name used by the evolver's servlet container.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Errors from building an [`EvolverApi`].
#[derive(Debug, thiserror::Error)]
pub enum ApiBuildError {
    #[error("Invalid evolver API URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP client for a single evolver deployment.
pub struct EvolverApi {
    client: reqwest::Client,
    api_url: String,
}

impl EvolverApi {
    /// Create an API client with a cookie store and the configured
    /// request timeout.
    ///
    /// When `config.session_cookie` is set the store starts out holding
    /// that session, so the client sees the run submitted under it.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ApiBuildError> {
        let url = reqwest::Url::parse(&config.api_url).map_err(|e| ApiBuildError::InvalidUrl {
            url: config.api_url.clone(),
            reason: e.to_string(),
        })?;

        let jar = reqwest::cookie::Jar::default();
        if let Some(session) = &config.session_cookie {
            jar.add_cookie_str(&session_cookie(session), &url);
            tracing::debug!(api_url = %config.api_url, "Resuming existing evolver session");
        }

        let client = reqwest::Client::builder()
            .cookie_provider(Arc::new(jar))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    ///
    /// The client must keep cookies for polls to reach the submitted run.
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a new evolution run.
    ///
    /// Sends `POST evolve.do` with the form as a multipart body.
    pub async fn submit(&self, form: &JobForm) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.endpoint(SUBMIT_PATH))
            .multipart(form.to_multipart())
            .send()
            .await
            .map_err(request_error)?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Fetch the generations produced since the previous poll.
    ///
    /// Sends `POST progress.update`. An empty or `null` body yields `None`.
    pub async fn progress(&self) -> Result<Option<ProgressSnapshot>, TransportError> {
        let response = self
            .client
            .post(self.endpoint(PROGRESS_PATH))
            .send()
            .await
            .map_err(request_error)?;

        let response = Self::ensure_success(response).await?;
        let text = response.text().await.map_err(request_error)?;
        parse_progress(&text).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Ask the run to stop after its current generation.
    ///
    /// Sends `POST evolution.terminate`. The run keeps going until the
    /// server reports a final status.
    pub async fn terminate(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.endpoint(TERMINATE_PATH))
            .send()
            .await
            .map_err(request_error)?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`TransportError::Status`]
    /// carrying the status, content type and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                content_type,
                body,
            });
        }
        Ok(response)
    }
}

/// Cookie string for a session given either as a bare id or as
/// `NAME=value`. Scoped to the whole host so every endpoint sends it.
fn session_cookie(session: &str) -> String {
    if session.contains('=') {
        format!("{session}; Path=/")
    } else {
        format!("{SESSION_COOKIE}={session}; Path=/")
    }
}

/// A request that produced no usable response counts as a lost connection,
/// except for decode failures, which mean the server did answer.
fn request_error(err: reqwest::Error) -> TransportError {
    if err.is_decode() {
        TransportError::Malformed(err.to_string())
    } else {
        TransportError::Connection(err.to_string())
    }
}

#[async_trait]
impl JobTransport for EvolverApi {
    async fn submit_job(&self, form: &JobForm) -> Result<JobHandle, TransportError> {
        self.submit(form).await?;
        Ok(JobHandle::new())
    }

    async fn fetch_progress(&self) -> Result<Option<ProgressSnapshot>, TransportError> {
        self.progress().await
    }

    async fn request_termination(&self) -> Result<(), TransportError> {
        self.terminate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let api = EvolverApi::with_client(
            reqwest::Client::new(),
            "http://localhost:8080/compound-evolver/".into(),
        );
        assert_eq!(api.api_url(), "http://localhost:8080/compound-evolver");
        assert_eq!(
            api.endpoint(PROGRESS_PATH),
            "http://localhost:8080/compound-evolver/progress.update"
        );
    }

    #[test]
    fn session_cookie_accepts_bare_id_or_pair() {
        assert_eq!(session_cookie("A1B2"), "JSESSIONID=A1B2; Path=/");
        assert_eq!(session_cookie("SESSION=xyz"), "SESSION=xyz; Path=/");
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let config = EngineConfig {
            api_url: "not a url".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            EvolverApi::from_config(&config),
            Err(ApiBuildError::InvalidUrl { .. })
        ));
    }
}
