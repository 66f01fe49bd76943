//! JSON report of a finished (or abandoned) run.

use std::path::Path;

use evo_core::aggregates::{CategoryCountView, ScoreRecord};
use evo_core::candidate::Candidate;
use evo_core::run::{RunSession, RunState};
use evo_core::types::{GenerationNumber, JobHandle};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-generation line of the report.
#[derive(Debug, Serialize)]
pub struct GenerationSummary<'a> {
    pub number: GenerationNumber,
    pub population: usize,
    pub fittest: Option<&'a Candidate>,
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub state: RunState,
    pub job: Option<&'a JobHandle>,
    pub error: Option<&'a str>,
    pub generations: Vec<GenerationSummary<'a>>,
    pub scores: &'a [ScoreRecord],
    pub categories: &'a CategoryCountView,
}

impl<'a> Report<'a> {
    pub fn from_session(session: &'a RunSession) -> Self {
        let generations = session
            .store()
            .ordered_generations()
            .map(|generation| GenerationSummary {
                number: generation.number,
                population: generation.candidates.len(),
                fittest: generation.fittest(),
            })
            .collect();

        Self {
            state: session.state(),
            job: session.job(),
            error: session.last_error(),
            generations,
            scores: session.scores().records(),
            categories: session.category_counts(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ReportError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Serialize the session's report and write it to `path`.
pub async fn write_report(path: &Path, session: &RunSession) -> Result<(), ReportError> {
    let bytes = Report::from_session(session).to_json()?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
