//! JSON run report
//!
//! Writes every outcome plus the run totals to a file when the run stops.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::models::{Outcome, RunSummary};
use crate::result::ResultHandler;

/// Serialized form of a finished run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub outcomes: Vec<Outcome>,
}

impl JsonReport {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse report {}", path.display()))
    }
}

/// Handler that saves a [`JsonReport`] on `stop_test_run`
pub struct JsonReportHandler {
    path: PathBuf,
    started_at: Option<DateTime<Utc>>,
    outcomes: Vec<Outcome>,
}

impl JsonReportHandler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            started_at: None,
            outcomes: Vec::new(),
        }
    }

    pub fn report(&self) -> JsonReport {
        let finished_at = Utc::now();
        let mut summary = RunSummary::from_outcomes(&self.outcomes);
        let started_at = self.started_at.unwrap_or(finished_at);
        summary.duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        JsonReport {
            started_at,
            finished_at,
            summary,
            outcomes: self.outcomes.clone(),
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.report())?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write report {}", self.path.display()))?;
        Ok(())
    }
}

impl ResultHandler for JsonReportHandler {
    fn start_test_run(&mut self) {
        self.started_at = Some(Utc::now());
        self.outcomes.clear();
    }

    fn stop_test_run(&mut self) {
        match self.save() {
            Ok(()) => info!("JSON report written to {}", self.path.display()),
            Err(e) => error!("Failed to save JSON report: {:#}", e),
        }
    }

    fn handle(&mut self, outcome: &Outcome) {
        self.outcomes.push(outcome.clone());
    }
}
