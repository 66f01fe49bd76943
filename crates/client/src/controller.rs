//! Polling controller for a single evolution run.
//!
//! [`PollingController`] owns the [`RunSession`] and is the only writer to
//! it. It submits jobs, attaches to a run found on load, and drives a
//! cancellable polling cycle that reconciles each progress response into
//! the session before the next tick.
//!
//! Run-level changes are broadcast as [`EngineEvent`]s. Call
//! [`PollingController::subscribe`] to receive them.

use std::sync::{Arc, Weak};
use std::time::Duration;

use evo_core::error::{ClassifiedError, CoreError};
use evo_core::run::{RunSession, RunState, Transition, CONNECTION_LOST_MESSAGE, DEFAULT_MAX_TRANSIENT_FAILURES};
use evo_core::snapshot::ProgressSnapshot;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::classify::classify;
use crate::events::EngineEvent;
use crate::form::JobForm;
use crate::transport::{JobTransport, TransportError};

/// Default time between progress polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Broadcast channel capacity for engine events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lower bound on the poll period; a zero period would spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long [`PollingController::shutdown`] waits for the cycle task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_transient_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_transient_failures: DEFAULT_MAX_TRANSIENT_FAILURES,
        }
    }
}

/// Result of a single [`PollingController::poll_once`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A fetch was already outstanding; this tick did nothing.
    Skipped,
    /// No run is active.
    Inactive,
    /// The fetch result (or failure) was applied to the session.
    Applied(Transition),
}

impl PollOutcome {
    /// Whether the polling cycle should stop after this outcome.
    pub fn ends_cycle(&self) -> bool {
        match self {
            PollOutcome::Skipped => false,
            PollOutcome::Inactive => true,
            PollOutcome::Applied(transition) => {
                transition.is_terminal() || *transition == Transition::Ignored
            }
        }
    }
}

/// Errors returned by controller operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("A run is already in progress")]
    RunInProgress,

    /// The server (or the network) refused the request.
    #[error("{0}")]
    Rejected(ClassifiedError),

    #[error("Termination request failed: {0}")]
    TerminationFailed(#[source] TransportError),
}

/// Background polling task and its cancellation token.
struct PollingCycle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps a [`RunSession`] in sync with a remote evolution run.
///
/// Created via [`PollingController::new`]; the returned `Arc` is what the
/// polling task holds a weak reference to.
pub struct PollingController {
    transport: Arc<dyn JobTransport>,
    config: PollConfig,
    session: RwLock<RunSession>,
    event_tx: broadcast::Sender<EngineEvent>,
    /// Held for the duration of every fetch and submission. At most one
    /// request touches the run at a time.
    in_flight: Mutex<()>,
    cycle: Mutex<Option<PollingCycle>>,
}

impl PollingController {
    pub fn new(transport: Arc<dyn JobTransport>, config: PollConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            transport,
            config,
            session: RwLock::new(RunSession::new(config.max_transient_failures)),
            event_tx,
            in_flight: Mutex::new(()),
            cycle: Mutex::new(None),
        })
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub async fn state(&self) -> RunState {
        self.session.read().await.state()
    }

    /// Run `f` against a read-only view of the session.
    pub async fn read<R>(&self, f: impl FnOnce(&RunSession) -> R) -> R {
        let session = self.session.read().await;
        f(&session)
    }

    /// Select the generation at `index` in generation-number order.
    pub async fn select_generation(&self, index: usize) -> Result<(), CoreError> {
        self.session.write().await.select_generation(index)
    }

    pub async fn clear_selection(&self) {
        self.session.write().await.clear_selection();
    }

    /// Whether the polling task is alive.
    pub async fn is_polling(&self) -> bool {
        self.cycle
            .lock()
            .await
            .as_ref()
            .is_some_and(|cycle| !cycle.handle.is_finished())
    }

    /// Look for a run already attached to this client's server session.
    ///
    /// Runs once, immediately. A run that is still going starts the polling
    /// cycle; a finished one is loaded as-is; an empty answer leaves the
    /// controller idle. Fetch failures are returned without changing state.
    pub async fn catch_up(self: &Arc<Self>) -> Result<RunState, EngineError> {
        let _guard = self.in_flight.lock().await;
        if self.state().await == RunState::Running {
            return Err(EngineError::RunInProgress);
        }

        let snapshot = match self.transport.fetch_progress().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!("No evolution run found on the server");
                return Ok(self.state().await);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Initial progress fetch failed");
                return Err(EngineError::Rejected(classify(&e)));
            }
        };

        let (transition, state, total) = {
            let mut session = self.session.write().await;
            let transition = session.attach(snapshot);
            (transition, session.state(), session.store().len())
        };

        tracing::info!(
            state = state.as_str(),
            generations = total,
            "Attached to existing evolution run",
        );
        self.emit(EngineEvent::RunStarted {
            run_id: None,
            attached: true,
        });
        self.publish(&transition, total);

        if state == RunState::Running {
            self.start_cycle().await;
        }
        Ok(state)
    }

    /// Submit a new run, discarding everything kept from the previous one.
    ///
    /// Rejected while a run is in progress. A refused submission leaves the
    /// session `Failed` with the classified message.
    pub async fn submit(self: &Arc<Self>, form: &JobForm) -> Result<(), EngineError> {
        let _guard = self.in_flight.lock().await;
        if self.state().await == RunState::Running {
            return Err(EngineError::RunInProgress);
        }

        self.stop_cycle().await;
        self.session.write().await.begin_run();

        match self.transport.submit_job(form).await {
            Ok(job) => {
                let run_id = job.run_id();
                self.session.write().await.set_job(job);
                tracing::info!(%run_id, "Evolution run submitted");
                self.emit(EngineEvent::RunStarted {
                    run_id: Some(run_id),
                    attached: false,
                });
                self.start_cycle().await;
                Ok(())
            }
            Err(e) => {
                let classified = classify(&e);
                let message = classified
                    .message
                    .clone()
                    .unwrap_or_else(|| CONNECTION_LOST_MESSAGE.to_string());
                tracing::error!(error = %e, "Evolution run submission failed");
                let transition = self.session.write().await.fail(message);
                self.publish(&transition, 0);
                Err(EngineError::Rejected(classified))
            }
        }
    }

    /// One poll: fetch, then reconcile or record the failure.
    ///
    /// Returns [`PollOutcome::Skipped`] without touching the network when
    /// another fetch is still outstanding.
    pub async fn poll_once(&self) -> PollOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("Previous poll still outstanding, skipping tick");
            return PollOutcome::Skipped;
        };
        if self.state().await != RunState::Running {
            return PollOutcome::Inactive;
        }

        let result = self.transport.fetch_progress().await;

        let (transition, total) = {
            let mut session = self.session.write().await;
            let transition = match result {
                // An empty body mid-run carries no news; it still proves
                // the server is reachable.
                Ok(snapshot) => session.reconcile(snapshot.unwrap_or_else(ProgressSnapshot::empty)),
                Err(e) => {
                    tracing::debug!(error = %e, "Progress fetch failed");
                    session.record_failure(classify(&e))
                }
            };
            (transition, session.store().len())
        };

        self.publish(&transition, total);
        PollOutcome::Applied(transition)
    }

    /// Ask the server to stop the run after its current generation.
    ///
    /// Advisory only: polling continues until the server reports a final
    /// status. A failed request does not change the run state.
    pub async fn request_termination(&self) -> Result<(), EngineError> {
        match self.transport.request_termination().await {
            Ok(()) => {
                tracing::info!("Termination requested");
                self.emit(EngineEvent::TerminationRequested);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Termination request failed");
                Err(EngineError::TerminationFailed(e))
            }
        }
    }

    /// Stop the polling cycle. The session keeps its data and state.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down polling controller");
        self.stop_cycle().await;
    }

    // ---- private helpers ----

    async fn start_cycle(self: &Arc<Self>) {
        let period = self.config.interval.max(MIN_POLL_INTERVAL);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_cycle(Arc::downgrade(self), period, cancel.clone()));

        let previous = self.cycle.lock().await.replace(PollingCycle { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    async fn stop_cycle(&self) {
        let Some(cycle) = self.cycle.lock().await.take() else {
            return;
        };
        cycle.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, cycle.handle).await.is_err() {
            tracing::warn!("Polling task did not stop in time");
        }
    }

    fn publish(&self, transition: &Transition, total_generations: usize) {
        if !transition.appended().is_empty() {
            tracing::debug!(generations = ?transition.appended(), "Generations appended");
            self.emit(EngineEvent::GenerationsAppended {
                generations: transition.appended().to_vec(),
            });
        }

        match transition {
            Transition::Progressed { .. } | Transition::Ignored => {}
            Transition::TransientFailure { consecutive } => {
                tracing::warn!(
                    consecutive_failures = consecutive,
                    max = self.config.max_transient_failures,
                    "Progress poll got no response",
                );
                self.emit(EngineEvent::TransientFailure {
                    consecutive: *consecutive,
                });
            }
            Transition::Succeeded { .. } => {
                tracing::info!(generations = total_generations, "Evolution run succeeded");
                self.emit(EngineEvent::RunSucceeded { total_generations });
            }
            Transition::Failed { message, .. } => {
                tracing::error!(error = %message, "Evolution run failed");
                self.emit(EngineEvent::RunFailed {
                    message: message.clone(),
                });
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

/// Poll every `period` until a terminal outcome, cancellation, or the
/// controller being dropped. The first poll happens one period after start.
async fn run_cycle(controller: Weak<PollingController>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::debug!(poll_interval_ms = period.as_millis() as u64, "Polling cycle started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => break,
                    outcome = controller.poll_once() => outcome,
                };
                if outcome.ends_cycle() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Polling cycle stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_that_end_the_cycle() {
        assert!(!PollOutcome::Skipped.ends_cycle());
        assert!(PollOutcome::Inactive.ends_cycle());
        assert!(PollOutcome::Applied(Transition::Ignored).ends_cycle());
        assert!(PollOutcome::Applied(Transition::Succeeded { appended: vec![] }).ends_cycle());
        assert!(!PollOutcome::Applied(Transition::Progressed { appended: vec![1] }).ends_cycle());
        assert!(!PollOutcome::Applied(Transition::TransientFailure { consecutive: 3 }).ends_cycle());
    }

    #[test]
    fn default_poll_config() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.max_transient_failures, 12);
    }
}
