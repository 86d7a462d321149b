//! Run reports: what a pipeline run did to each issue, persisted as JSON.

mod store;

pub use store::ReportStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{IssueOutcome, PipelineSettings};

/// Aggregate counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Correction rounds spent across all issues.
    pub auto_fix_rounds: u32,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[IssueOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            auto_fix_rounds: outcomes.iter().map(|o| o.auto_fix_rounds).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub assignee: String,
    pub concurrency: usize,
    pub max_fix_rounds: u32,
    pub outcomes: Vec<IssueOutcome>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(assignee: &str, settings: &PipelineSettings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            assignee: assignee.to_string(),
            concurrency: settings.concurrency,
            max_fix_rounds: settings.max_fix_rounds,
            outcomes: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    /// Record the outcomes, sorted by issue id, and stamp the end time.
    pub fn finish(&mut self, mut outcomes: Vec<IssueOutcome>) {
        outcomes.sort_by(|a, b| a.issue_id.cmp(&b.issue_id));
        self.summary = RunSummary::from_outcomes(&outcomes);
        self.outcomes = outcomes;
        self.ended_at = Some(Utc::now());
    }

    pub fn short_id(&self) -> String {
        self.run_id.simple().to_string()[..8].to_string()
    }

    /// File name used by [`ReportStore`]: `<timestamp>_<short-id>.json`.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.json",
            self.started_at.format("%Y-%m-%dT%H-%M-%S"),
            self.short_id()
        )
    }
}
