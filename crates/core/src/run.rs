//! Run session state machine.
//!
//! A [`RunSession`] holds everything the client knows about the current
//! run: its lifecycle state, the generation ledger, the aggregate views,
//! the consecutive transient-failure counter and the selected generation.
//! The polling controller feeds it poll results and classified failures;
//! the session decides the resulting [`Transition`].
//!
//! ```text
//! Idle --submit/attach--> Running --success--> Succeeded
//!                            |   \--failed/fatal--> Failed
//!                            \-- poll / transient failure (stays Running)
//! ```
//!
//! `Succeeded` and `Failed` absorb every further poll result. Only a new
//! run (`begin_run` / `attach`) leaves them, and that clears all data.

use serde::Serialize;

use crate::aggregates::{AggregateTracker, CategoryCountView, ScoreView};
use crate::candidate::{Candidate, Generation};
use crate::error::{ClassifiedError, CoreError, FailureKind};
use crate::snapshot::{ProgressSnapshot, RunStatus};
use crate::store::GenerationStore;
use crate::types::{GenerationNumber, JobHandle};

/// Consecutive transient failures after which the run is given up.
pub const DEFAULT_MAX_TRANSIENT_FAILURES: u32 = 12;

/// Shown when the transient-failure budget runs out.
pub const CONNECTION_LOST_MESSAGE: &str = "An error has occurred: the connection has failed";

/// Shown when the server reports failure without saying why.
pub const RUN_FAILED_MESSAGE: &str = "The evolution run failed on the server";

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Client-side lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// What a poll result or failure did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The run continues. Lists newly stored generation numbers.
    Progressed { appended: Vec<GenerationNumber> },
    /// The server reported success.
    Succeeded { appended: Vec<GenerationNumber> },
    /// The run ended in failure, reported by the server or decided locally.
    Failed {
        appended: Vec<GenerationNumber>,
        message: String,
    },
    /// A transient failure was absorbed by the retry budget.
    TransientFailure { consecutive: u32 },
    /// The session was not running; nothing changed.
    Ignored,
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Transition::Succeeded { .. } | Transition::Failed { .. })
    }

    /// Generation numbers stored by this transition.
    pub fn appended(&self) -> &[GenerationNumber] {
        match self {
            Transition::Progressed { appended }
            | Transition::Succeeded { appended }
            | Transition::Failed { appended, .. } => appended,
            Transition::TransientFailure { .. } | Transition::Ignored => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// RunSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunSession {
    state: RunState,
    job: Option<JobHandle>,
    store: GenerationStore,
    aggregates: AggregateTracker,
    consecutive_failures: u32,
    max_transient_failures: u32,
    last_error: Option<String>,
    /// Selected generation, kept by number so it survives out-of-order
    /// arrivals that shift positions.
    selected: Option<GenerationNumber>,
}

impl RunSession {
    pub fn new(max_transient_failures: u32) -> Self {
        Self {
            state: RunState::Idle,
            job: None,
            store: GenerationStore::new(),
            aggregates: AggregateTracker::new(),
            consecutive_failures: 0,
            max_transient_failures,
            last_error: None,
            selected: None,
        }
    }

    // ---- lifecycle ----

    /// Clear every trace of the previous run and start a new one.
    pub fn begin_run(&mut self) {
        self.store.reset();
        self.aggregates.reset();
        self.consecutive_failures = 0;
        self.last_error = None;
        self.selected = None;
        self.job = None;
        self.state = RunState::Running;
    }

    pub fn set_job(&mut self, job: JobHandle) {
        self.job = Some(job);
    }

    /// Adopt a run that was already underway when the client started.
    ///
    /// Merges the server's backlog and the fresh buffer; a terminal status
    /// leaves the session showing the finished run.
    pub fn attach(&mut self, snapshot: ProgressSnapshot) -> Transition {
        self.begin_run();
        let ProgressSnapshot {
            status,
            generations,
            backlog,
            exceptions,
        } = snapshot;
        let appended = self.merge(backlog.into_iter().chain(generations));
        self.apply_status(status, exceptions, appended)
    }

    /// Apply one successful poll.
    ///
    /// The server empties its buffer when it answers, so a lost response
    /// leaves those generations only in the backlog. Both are merged; the
    /// store skips what it already holds.
    pub fn reconcile(&mut self, snapshot: ProgressSnapshot) -> Transition {
        if self.state != RunState::Running {
            return Transition::Ignored;
        }
        self.consecutive_failures = 0;
        let ProgressSnapshot {
            status,
            generations,
            backlog,
            exceptions,
        } = snapshot;
        let appended = self.merge(backlog.into_iter().chain(generations));
        self.apply_status(status, exceptions, appended)
    }

    /// Apply one classified poll failure.
    ///
    /// Transient failures are tolerated until `max_transient_failures`
    /// occur in a row; the failure that reaches the limit is fatal.
    pub fn record_failure(&mut self, error: ClassifiedError) -> Transition {
        if self.state != RunState::Running {
            return Transition::Ignored;
        }
        match error.kind {
            FailureKind::Transient => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.max_transient_failures {
                    self.fail(CONNECTION_LOST_MESSAGE)
                } else {
                    Transition::TransientFailure {
                        consecutive: self.consecutive_failures,
                    }
                }
            }
            FailureKind::Fatal => {
                let message = error
                    .message
                    .unwrap_or_else(|| CONNECTION_LOST_MESSAGE.to_string());
                self.fail(message)
            }
        }
    }

    /// End the run in failure, keeping whatever data was received.
    pub fn fail(&mut self, message: impl Into<String>) -> Transition {
        let message = message.into();
        self.mark_failed(&message);
        Transition::Failed {
            appended: Vec::new(),
            message,
        }
    }

    fn mark_failed(&mut self, message: &str) {
        self.state = RunState::Failed;
        self.consecutive_failures = 0;
        self.last_error = Some(message.to_owned());
    }

    fn merge<I>(&mut self, generations: I) -> Vec<GenerationNumber>
    where
        I: IntoIterator<Item = Generation>,
    {
        let appended = self.store.append(generations);
        for number in &appended {
            if let Some(generation) = self.store.get(*number) {
                self.aggregates.append(generation);
            }
        }
        appended
    }

    fn apply_status(
        &mut self,
        status: RunStatus,
        exceptions: Vec<String>,
        appended: Vec<GenerationNumber>,
    ) -> Transition {
        match status {
            RunStatus::NotStarted | RunStatus::Running => Transition::Progressed { appended },
            RunStatus::Success => {
                self.state = RunState::Succeeded;
                Transition::Succeeded { appended }
            }
            RunStatus::Failed => {
                let message = if exceptions.is_empty() {
                    RUN_FAILED_MESSAGE.to_string()
                } else {
                    exceptions.join(" ")
                };
                self.mark_failed(&message);
                Transition::Failed { appended, message }
            }
        }
    }

    // ---- selection ----

    /// Select a generation by its index in ascending generation order.
    pub fn select_generation(&mut self, index: usize) -> Result<(), CoreError> {
        let generation = self
            .store
            .nth(index)
            .ok_or(CoreError::SelectionOutOfRange {
                index,
                len: self.store.len(),
            })?;
        self.selected = Some(generation.number);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Current index of the selected generation.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected.and_then(|number| self.store.position(number))
    }

    pub fn selected_generation(&self) -> Option<&Generation> {
        self.selected.and_then(|number| self.store.get(number))
    }

    /// Candidates of the selected generation; empty without a selection.
    pub fn selected_population(&self) -> &[Candidate] {
        self.selected_generation()
            .map(|g| g.candidates.as_slice())
            .unwrap_or_default()
    }

    // ---- read access ----

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn job(&self) -> Option<&JobHandle> {
        self.job.as_ref()
    }

    pub fn store(&self) -> &GenerationStore {
        &self.store
    }

    pub fn scores(&self) -> &ScoreView {
        self.aggregates.scores()
    }

    pub fn category_counts(&self) -> &CategoryCountView {
        self.aggregates.category_counts()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_data(&self) -> bool {
        !self.store.is_empty()
    }
}

impl Default for RunSession {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRANSIENT_FAILURES)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::candidate::Candidate;

    fn candidate(category: &str) -> Candidate {
        Candidate {
            id: 1,
            category: category.into(),
            raw_score: -8.0,
            ligand_efficiency: 0.3,
            ligand_lipophilicity_efficiency: 2.0,
            fitness: Some(0.5),
            smiles: "c1ccccc1".into(),
            iupac_name: "benzene".into(),
            rmsd: None,
        }
    }

    fn generation(number: GenerationNumber) -> Generation {
        Generation::new(number, vec![candidate("A")])
    }

    fn running() -> RunSession {
        let mut session = RunSession::default();
        session.begin_run();
        session
    }

    #[test]
    fn starts_idle_and_ignores_polls() {
        let mut session = RunSession::default();
        assert_eq!(session.state(), RunState::Idle);
        let transition = session.reconcile(ProgressSnapshot::new(RunStatus::Running, vec![generation(0)]));
        assert_eq!(transition, Transition::Ignored);
        assert!(!session.has_data());
    }

    #[test]
    fn reconcile_appends_and_continues() {
        let mut session = running();
        let transition =
            session.reconcile(ProgressSnapshot::new(RunStatus::Running, vec![generation(0), generation(1)]));

        assert_eq!(transition, Transition::Progressed { appended: vec![0, 1] });
        assert_eq!(session.store().len(), 2);
        assert_eq!(session.scores().len(), 2);
        assert_eq!(session.category_counts().records().len(), 2);
    }

    #[test]
    fn redelivered_buffer_does_not_touch_aggregates() {
        let mut session = running();
        let buffer = vec![generation(0)];
        session.reconcile(ProgressSnapshot::new(RunStatus::Running, buffer.clone()));
        let transition = session.reconcile(ProgressSnapshot::new(RunStatus::Running, buffer));

        assert_eq!(transition, Transition::Progressed { appended: vec![] });
        assert_eq!(session.scores().len(), 1);
    }

    #[test]
    fn success_is_absorbing() {
        let mut session = running();
        let transition = session.reconcile(ProgressSnapshot::new(RunStatus::Success, vec![generation(0)]));
        assert_eq!(transition, Transition::Succeeded { appended: vec![0] });
        assert_eq!(session.state(), RunState::Succeeded);

        let later = session.reconcile(ProgressSnapshot::new(RunStatus::Running, vec![generation(1)]));
        assert_eq!(later, Transition::Ignored);
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn server_failure_uses_exception_messages() {
        let mut session = running();
        let snapshot = ProgressSnapshot::new(RunStatus::Failed, vec![generation(0)])
            .with_exceptions(vec!["Docking failed.".into(), "No conformers.".into()]);

        let transition = session.reconcile(snapshot);
        assert_matches!(transition, Transition::Failed { ref appended, ref message } => {
            assert_eq!(appended, &vec![0]);
            assert_eq!(message, "Docking failed. No conformers.");
        });
        assert_eq!(session.state(), RunState::Failed);
        assert_eq!(session.last_error(), Some("Docking failed. No conformers."));
    }

    #[test]
    fn server_failure_without_exceptions_uses_generic_message() {
        let mut session = running();
        let transition = session.reconcile(ProgressSnapshot::new(RunStatus::Failed, vec![]));
        assert_matches!(transition, Transition::Failed { message, .. } => {
            assert_eq!(message, RUN_FAILED_MESSAGE);
        });
    }

    #[test]
    fn eleven_transient_failures_are_tolerated() {
        let mut session = running();
        for expected in 1..=11 {
            let transition = session.record_failure(ClassifiedError::transient());
            assert_eq!(transition, Transition::TransientFailure { consecutive: expected });
        }
        assert_eq!(session.state(), RunState::Running);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn twelfth_transient_failure_is_fatal() {
        let mut session = running();
        for _ in 0..11 {
            session.record_failure(ClassifiedError::transient());
        }
        let transition = session.record_failure(ClassifiedError::transient());

        assert_matches!(transition, Transition::Failed { message, .. } => {
            assert_eq!(message, CONNECTION_LOST_MESSAGE);
        });
        assert_eq!(session.state(), RunState::Failed);
        assert_eq!(session.consecutive_failures(), 0);
    }

    #[test]
    fn success_resets_the_failure_counter() {
        let mut session = running();
        for _ in 0..11 {
            session.record_failure(ClassifiedError::transient());
        }
        session.reconcile(ProgressSnapshot::empty());
        assert_eq!(session.consecutive_failures(), 0);

        let transition = session.record_failure(ClassifiedError::transient());
        assert_eq!(transition, Transition::TransientFailure { consecutive: 1 });
    }

    #[test]
    fn fatal_failure_ends_run_immediately() {
        let mut session = running();
        let transition = session.record_failure(ClassifiedError::fatal("Reactant file is invalid"));
        assert_matches!(transition, Transition::Failed { message, .. } => {
            assert_eq!(message, "Reactant file is invalid");
        });
        assert_eq!(session.state(), RunState::Failed);
    }

    #[test]
    fn failures_after_terminal_are_ignored() {
        let mut session = running();
        session.fail("boom");
        assert_eq!(session.record_failure(ClassifiedError::transient()), Transition::Ignored);
    }

    #[test]
    fn begin_run_resets_everything() {
        let mut session = running();
        session.reconcile(ProgressSnapshot::new(RunStatus::Running, vec![generation(0)]));
        session.select_generation(0).unwrap();
        session.record_failure(ClassifiedError::transient());
        session.fail("lost");

        session.begin_run();
        assert_eq!(session.state(), RunState::Running);
        assert!(!session.has_data());
        assert!(session.scores().is_empty());
        assert!(!session.category_counts().is_established());
        assert_eq!(session.consecutive_failures(), 0);
        assert!(session.last_error().is_none());
        assert!(session.selected_index().is_none());
    }

    #[test]
    fn attach_merges_backlog_then_buffer() {
        let mut session = RunSession::default();
        let snapshot = ProgressSnapshot::new(RunStatus::Running, vec![generation(2)])
            .with_backlog(vec![generation(0), generation(1)]);

        let transition = session.attach(snapshot);
        assert_eq!(transition, Transition::Progressed { appended: vec![0, 1, 2] });
        assert_eq!(session.state(), RunState::Running);
    }

    #[test]
    fn attach_to_finished_run_shows_results() {
        let mut session = RunSession::default();
        let snapshot =
            ProgressSnapshot::new(RunStatus::Success, vec![]).with_backlog(vec![generation(0)]);

        let transition = session.attach(snapshot);
        assert_eq!(transition, Transition::Succeeded { appended: vec![0] });
        assert_eq!(session.state(), RunState::Succeeded);
        assert!(session.has_data());
    }

    #[test]
    fn generation_from_lost_response_is_recovered_from_backlog() {
        let mut session = running();
        session.reconcile(ProgressSnapshot::new(RunStatus::Running, vec![generation(0)]));
        // The response carrying generation 1 never arrived.
        session.record_failure(ClassifiedError::transient());

        let transition = session.reconcile(
            ProgressSnapshot::new(RunStatus::Running, vec![generation(2)])
                .with_backlog(vec![generation(0), generation(1), generation(2)]),
        );

        assert_eq!(transition, Transition::Progressed { appended: vec![1, 2] });
        let stored: Vec<_> = session.store().ordered_generations().map(|g| g.number).collect();
        assert_eq!(stored, vec![0, 1, 2]);
        assert_eq!(session.scores().len(), 3);
        assert_eq!(session.consecutive_failures(), 0);
    }

    #[test]
    fn selection_follows_generation_across_reordering() {
        let mut session = running();
        session.reconcile(ProgressSnapshot::new(RunStatus::Running, vec![generation(3)]));
        session.select_generation(0).unwrap();
        assert_eq!(session.selected_generation().map(|g| g.number), Some(3));

        session.reconcile(ProgressSnapshot::new(RunStatus::Running, vec![generation(1)]));
        assert_eq!(session.selected_index(), Some(1));
        assert_eq!(session.selected_population().len(), 1);
    }

    #[test]
    fn selecting_out_of_range_fails() {
        let mut session = running();
        let err = session.select_generation(0).unwrap_err();
        assert_matches!(err, CoreError::SelectionOutOfRange { index: 0, len: 0 });
        assert!(session.selected_population().is_empty());
    }
}
