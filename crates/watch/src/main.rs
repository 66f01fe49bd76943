//! `evo-watch` -- follow a compound evolver run from the terminal.
//!
//! Submits a job described by a form manifest, or attaches to the run
//! tied to the server session named by `EVOLVER_SESSION`, then logs progress until
//! the run finishes. Ctrl-C asks the server to stop the run; a second
//! Ctrl-C stops following.
//!
//! # Environment variables
//!
//! | Variable                 | Required | Default | Description                                 |
//! |--------------------------|----------|---------|---------------------------------------------|
//! | `EVOLVER_API_URL`        | no       | `http://localhost:8080/compound-evolver` | Base URL of the evolver |
//! | `POLL_INTERVAL_SECS`     | no       | `5`     | Seconds between progress polls              |
//! | `MAX_TRANSIENT_FAILURES` | no       | `12`    | Unanswered polls before giving up           |
//! | `REQUEST_TIMEOUT_SECS`   | no       | `30`    | Per-request timeout                         |
//! | `EVOLVER_SESSION`        | no       | --      | Session id of an existing run to attach to  |
//! | `EVOLVER_FORM`           | no       | --      | Form manifest to submit; attach when unset  |
//! | `EVOLVER_REPORT`         | no       | --      | Where to write the JSON report              |

use std::path::PathBuf;
use std::sync::Arc;

use evo_client::api::EvolverApi;
use evo_client::config::EngineConfig;
use evo_client::controller::PollingController;
use evo_client::form::JobForm;
use evo_core::run::RunState;
use evo_watch::follow::follow;
use evo_watch::report::write_report;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evo_watch=info,evo_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });
    let form_path = std::env::var("EVOLVER_FORM").ok().map(PathBuf::from);
    let report_path = std::env::var("EVOLVER_REPORT").ok().map(PathBuf::from);

    tracing::info!(
        api_url = %config.api_url,
        poll_interval_secs = config.poll_interval.as_secs(),
        max_transient_failures = config.max_transient_failures,
        "Starting evo-watch",
    );

    let api = EvolverApi::from_config(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build API client");
        std::process::exit(1);
    });
    let controller = PollingController::new(Arc::new(api), config.poll_config());
    let events = controller.subscribe();

    match form_path {
        Some(path) => {
            let form = JobForm::from_manifest(&path).await.unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to load form manifest");
                std::process::exit(1);
            });
            if let Err(e) = controller.submit(&form).await {
                tracing::error!(error = %e, "Submission rejected");
            }
        }
        None => match controller.catch_up().await {
            Ok(RunState::Idle) => {
                tracing::info!(
                    "Nothing to follow; set EVOLVER_FORM to submit a run or EVOLVER_SESSION to attach"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Initial progress fetch failed");
                std::process::exit(1);
            }
        },
    }

    let state = match controller.state().await {
        RunState::Running => follow(&controller, events).await,
        state => state,
    };

    controller
        .read(|session| {
            let fittest = session.store().latest().and_then(|g| g.fittest());
            tracing::info!(
                state = state.as_str(),
                generations = session.store().len(),
                categories = session.category_counts().categories().len(),
                fittest_id = fittest.map(|c| c.id),
                fittest_smiles = fittest.map(|c| c.smiles.as_str()),
                fittest_score = fittest.map(|c| c.raw_score),
                "Run summary",
            );
        })
        .await;

    if let Some(path) = report_path {
        let session = controller.read(|session| session.clone()).await;
        match write_report(&path, &session).await {
            Ok(()) => tracing::info!(path = %path.display(), "Report written"),
            Err(e) => tracing::error!(error = %e, "Failed to write report"),
        }
    }

    if state == RunState::Failed {
        std::process::exit(1);
    }
}
