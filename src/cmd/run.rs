//! Pipeline execution: `issueflow run`.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::sync::mpsc;

use issueflow::capabilities::Capabilities;
use issueflow::config::{IssueflowToml, config_dir, runs_dir};
use issueflow::pipeline::{
    IssueOutcome, IssueState, PipelineEvent, PipelineOrchestrator, PipelineSettings,
};
use issueflow::report::{ReportStore, RunReport};

/// Values given on the command line, applied over file and environment.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub assignee: Option<String>,
    pub concurrency: Option<usize>,
    pub max_fix_rounds: Option<u32>,
}

impl RunOverrides {
    fn apply(&self, config: &mut IssueflowToml) {
        if let Some(assignee) = &self.assignee {
            config.pipeline.assignee = assignee.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.pipeline.concurrency = concurrency;
        }
        if let Some(rounds) = self.max_fix_rounds {
            config.pipeline.max_fix_rounds = rounds;
        }
    }
}

pub async fn cmd_run(project_dir: &Path, overrides: RunOverrides, json: bool) -> Result<()> {
    let mut config = IssueflowToml::load_or_default(&config_dir(project_dir))?;
    config.apply_env()?;
    overrides.apply(&mut config);
    config.pipeline.artifact_path()?;
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    let assignee = config.pipeline.assignee.clone();
    let settings = PipelineSettings::from_config(&config);
    let caps = Capabilities::from_config(&config);
    let mut report = RunReport::new(&assignee, &settings);

    let (tx, rx) = mpsc::channel(64);
    let progress = tokio::spawn(print_progress(rx, !json));
    let orchestrator = PipelineOrchestrator::new(caps, settings).with_event_channel(tx);
    let result = orchestrator.run(&assignee).await;
    drop(orchestrator);
    progress.await.ok();

    let outcomes = result.with_context(|| format!("Pipeline run for '{}' failed", assignee))?;
    report.finish(outcomes);

    let store = ReportStore::new(&runs_dir(project_dir));
    let path = store.save(&report)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
        );
    } else {
        println!();
        print_outcomes(&report.outcomes);
        println!();
        println!(
            "{} issue(s): {} succeeded, {} failed, {} auto-fix round(s)",
            report.summary.total,
            report.summary.succeeded,
            report.summary.failed,
            report.summary.auto_fix_rounds
        );
        println!("Report saved to {}", path.display());
    }

    Ok(())
}

async fn print_progress(mut rx: mpsc::Receiver<PipelineEvent>, visible: bool) {
    while let Some(event) = rx.recv().await {
        if !visible {
            continue;
        }
        match event {
            PipelineEvent::BarrierStarted { stage, units } => {
                eprintln!("{stage}: {units} issue(s)");
            }
            PipelineEvent::UnitFinished {
                issue_id, advanced, ..
            } => {
                eprintln!("  {} {}", if advanced { "ok  " } else { "FAIL" }, issue_id);
            }
            PipelineEvent::BarrierCompleted { .. } | PipelineEvent::RunCompleted { .. } => {}
        }
    }
}

pub(crate) fn format_history(history: &[IssueState]) -> String {
    if history.is_empty() {
        return "-".to_string();
    }
    history
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Per-issue table shared by `run` and `runs show`.
pub(crate) fn print_outcomes(outcomes: &[IssueOutcome]) {
    if outcomes.is_empty() {
        println!("No issues were processed.");
        return;
    }

    println!(
        "{:<14} {:<8} {:<11} {:>7} {:>6} {:>6}  MERGE REQUEST",
        "ISSUE", "STATUS", "STATE", "TESTS", "SCORE", "FIXES"
    );
    for outcome in outcomes {
        let status = if outcome.is_success() { "ok" } else { "failed" };
        let state = outcome.final_state.map(|s| s.as_str()).unwrap_or("-");
        let tests = format!("{}/{}", outcome.tests_passed, outcome.tests_total);
        let score = outcome
            .analysis_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<8} {:<11} {:>7} {:>6} {:>6}  {}",
            outcome.issue_id,
            status,
            state,
            tests,
            score,
            outcome.auto_fix_rounds,
            outcome.merge_request.as_deref().unwrap_or("-")
        );
        if let Some(error) = &outcome.error {
            println!("  {error}");
        }
    }
}
