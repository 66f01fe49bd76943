use serde::Serialize;
use uuid::Uuid;

/// Server-assigned generation number, unique within one run.
pub type GenerationNumber = u32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque handle for one submitted run.
///
/// The server correlates polls through its own session; the handle only
/// gives the client a stable identifier to log and report against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    run_id: Uuid,
    submitted_at: Timestamp,
}

impl JobHandle {
    /// Create a handle for a run that was accepted just now.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            submitted_at: chrono::Utc::now(),
        }
    }

    /// Client-generated identifier of the run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the server accepted the submission.
    pub fn submitted_at(&self) -> Timestamp {
        self.submitted_at
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}
