use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Generation index {index} out of range ({len} generations stored)")]
    SelectionOutOfRange { index: usize, len: usize },
}

/// Whether a failure can be recovered from by retrying later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response reached the client; the same request may succeed later.
    Transient,
    /// The server rejected the request or answered with something unusable.
    /// Recovery needs a fresh submission.
    Fatal,
}

/// A transport failure after classification.
///
/// Transient failures carry no message: they stay invisible unless the
/// retry budget runs out, at which point the run session supplies its own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .message.as_deref().unwrap_or("transient connection failure"))]
pub struct ClassifiedError {
    pub kind: FailureKind,
    pub message: Option<String>,
}

impl ClassifiedError {
    pub fn transient() -> Self {
        Self {
            kind: FailureKind::Transient,
            message: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: Some(message.into()),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}
