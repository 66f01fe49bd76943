//! Evolver server JSON payloads and parsers.
//!
//! The progress endpoint answers with
//! `{"status": "...", "generations": [...], "generationBuffer": [...], ...}`
//! or with `null` when no run is attached to the session. Error responses
//! carry either `{"message": "...", "offspringRejectionMessages": [...]}`
//! or a bare JSON string.

use evo_core::candidate::Generation;
use evo_core::snapshot::{ProgressSnapshot, RunStatus};
use serde::Deserialize;

/// Run status values the server may send. Anything else fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireStatus {
    #[serde(alias = "NOT_STARTED")]
    Starting,
    Running,
    Success,
    Failed,
}

impl From<WireStatus> for RunStatus {
    fn from(status: WireStatus) -> Self {
        match status {
            WireStatus::Starting => RunStatus::NotStarted,
            WireStatus::Running => RunStatus::Running,
            WireStatus::Success => RunStatus::Success,
            WireStatus::Failed => RunStatus::Failed,
        }
    }
}

/// Body of a successful `progress.update` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMessage {
    /// `null` while the server has not set a status yet.
    pub status: Option<WireStatus>,
    /// Generations produced since the previous poll.
    #[serde(default)]
    pub generation_buffer: Vec<Generation>,
    /// Generations handed out by earlier polls.
    #[serde(default)]
    pub generations: Vec<Generation>,
    /// Serialized server-side exceptions; only their messages are used.
    #[serde(default)]
    pub exceptions: Vec<serde_json::Value>,
    #[serde(default)]
    pub termination_required: bool,
}

impl ProgressMessage {
    pub fn into_snapshot(self) -> ProgressSnapshot {
        let status = self.status.map(RunStatus::from).unwrap_or(RunStatus::NotStarted);
        let exceptions = self
            .exceptions
            .iter()
            .filter_map(exception_message)
            .collect();
        ProgressSnapshot::new(status, self.generation_buffer)
            .with_backlog(self.generations)
            .with_exceptions(exceptions)
    }
}

/// Pull a readable message out of a serialized exception.
fn exception_message(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(message) => Some(message.clone()),
        serde_json::Value::Object(fields) => fields
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_owned),
        _ => None,
    }
}

/// Parse a progress response body.
///
/// Returns `Ok(None)` for an empty or `null` body.
pub fn parse_progress(text: &str) -> Result<Option<ProgressSnapshot>, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let message: Option<ProgressMessage> = serde_json::from_str(text)?;
    Ok(message.map(ProgressMessage::into_snapshot))
}

/// Body of an application error response.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Structured {
        message: String,
        /// Why individual offspring were rejected, when the run gave up
        /// after too many failed candidates.
        #[serde(default, rename = "offspringRejectionMessages")]
        rejections: Vec<Option<String>>,
    },
    Plain(String),
}

impl ErrorBody {
    /// Primary message followed by any rejection reasons.
    pub fn describe(&self) -> String {
        match self {
            ErrorBody::Structured {
                message,
                rejections,
            } => {
                let reasons: Vec<&str> = rejections.iter().flatten().map(String::as_str).collect();
                if reasons.is_empty() {
                    message.clone()
                } else {
                    format!("{message} {}", reasons.join(","))
                }
            }
            ErrorBody::Plain(message) => message.clone(),
        }
    }
}

/// Parse an error response body, if it has a recognised shape.
pub fn parse_error_body(text: &str) -> Option<ErrorBody> {
    serde_json::from_str(text).ok()
}
