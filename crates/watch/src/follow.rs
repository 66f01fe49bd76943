use std::future::Future;
use std::sync::Arc;

use evo_client::controller::PollingController;
use evo_client::events::EngineEvent;
use evo_core::run::RunState;
use tokio::sync::broadcast::{self, error::RecvError};

/// Follow the active run until it finishes, stopping early on a second
/// Ctrl-C.
pub async fn follow(
    controller: &Arc<PollingController>,
    events: broadcast::Receiver<EngineEvent>,
) -> RunState {
    follow_with(controller, events, tokio::signal::ctrl_c).await
}

/// Follow the active run, taking interrupts from `interrupt`.
///
/// The first interrupt asks the server to terminate the run and keeps
/// following it; the second stops the polling cycle and returns whatever
/// state the run is in.
pub async fn follow_with<F, Fut>(
    controller: &Arc<PollingController>,
    mut events: broadcast::Receiver<EngineEvent>,
    mut interrupt: F,
) -> RunState
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    log_event(&event);
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged");
                    if controller.state().await.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            signal = interrupt() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for interrupts");
                    break;
                }
                if interrupted {
                    tracing::info!("Second interrupt, no longer following the run");
                    controller.shutdown().await;
                    break;
                }
                interrupted = true;
                tracing::info!("Interrupt received, asking the server to stop the run");
                if let Err(e) = controller.request_termination().await {
                    tracing::error!(error = %e, "Could not request termination");
                }
            }
        }
    }

    controller.state().await
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::RunStarted { run_id, attached } => {
            tracing::info!(run_id = ?run_id, attached, "Run started");
        }
        EngineEvent::GenerationsAppended { generations } => {
            for generation in generations {
                tracing::info!(generation, "Generation received");
            }
        }
        EngineEvent::TransientFailure { consecutive } => {
            tracing::warn!(consecutive_failures = consecutive, "Server unreachable, retrying");
        }
        EngineEvent::TerminationRequested => {
            tracing::info!("Termination requested, waiting for the run to stop");
        }
        EngineEvent::RunSucceeded { total_generations } => {
            tracing::info!(generations = total_generations, "Run finished");
        }
        EngineEvent::RunFailed { message } => {
            tracing::error!(error = %message, "Run failed");
        }
    }
}
