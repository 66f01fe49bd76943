//! Events emitted by the polling controller.
//!
//! These represent run-level state changes that observers (the watch
//! binary, charts) care about. Subscribe via
//! [`PollingController::subscribe`](crate::controller::PollingController::subscribe).

use evo_core::types::GenerationNumber;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A run became active, either by submission or by attaching to one
    /// already underway on the server.
    RunStarted {
        /// `None` when attaching: the client never saw the submission.
        run_id: Option<Uuid>,
        attached: bool,
    },

    /// Generations were stored, in arrival order.
    GenerationsAppended { generations: Vec<GenerationNumber> },

    /// A poll got no response; the run is still considered alive.
    TransientFailure { consecutive: u32 },

    /// The server accepted a request to stop after the current generation.
    TerminationRequested,

    RunSucceeded { total_generations: usize },

    RunFailed { message: String },
}

impl EngineEvent {
    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::RunSucceeded { .. } | EngineEvent::RunFailed { .. }
        )
    }
}
