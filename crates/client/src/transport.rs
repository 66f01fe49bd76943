//! The seam between the polling controller and the remote job.

use async_trait::async_trait;
use evo_core::snapshot::ProgressSnapshot;
use evo_core::types::JobHandle;

use crate::form::JobForm;

/// Errors from the transport boundary, before classification.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No response was received (connection refused, DNS, timeout, or the
    /// response was lost mid-body).
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server answered with a non-2xx status code.
    #[error("Evolver API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `Content-Type` header of the error response, if any.
        content_type: Option<String>,
        /// Raw response body.
        body: String,
    },

    /// A 2xx response whose body could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Remote operations the polling controller needs.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Start a new run. Success means the run exists and polling may begin.
    async fn submit_job(&self, form: &JobForm) -> Result<JobHandle, TransportError>;

    /// Fetch the generations produced since the previous call.
    ///
    /// `Ok(None)` means the server answered with an empty body: it does not
    /// know of any run for this client.
    async fn fetch_progress(&self) -> Result<Option<ProgressSnapshot>, TransportError>;

    /// Ask the run to stop after its current generation.
    async fn request_termination(&self) -> Result<(), TransportError>;
}
