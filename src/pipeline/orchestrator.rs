//! Barrier scheduler running Plan → Code → Review across a batch of issues.
//!
//! Each stage is a full join: every issue's unit of work for that stage is
//! dispatched onto a bounded worker pool and the next stage starts only once all
//! of them have reported. Units report tagged results over a channel, so a
//! failing or panicking unit produces a failed outcome for its own issue and
//! never discards what its siblings produced.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};

use super::autofix::{AutoFixLoop, MAX_ROUNDS};
use super::stages::StageRunner;
use super::state::{IssueState, IssueStateMachine};
use super::task::{Issue, IssueOutcome, ReviewLogs, Stage, StageOutcome, Task};
use crate::capabilities::Capabilities;
use crate::config::IssueflowToml;
use crate::errors::{PipelineError, StageError};
use crate::report::RunSummary;

/// Progress events emitted while a run executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A stage barrier dispatched its units.
    BarrierStarted { stage: Stage, units: usize },
    /// One unit of a barrier reported back.
    UnitFinished {
        stage: Stage,
        issue_id: String,
        advanced: bool,
    },
    /// Every unit of a barrier has reported.
    BarrierCompleted {
        stage: Stage,
        advanced: usize,
        failed: usize,
    },
    /// All barriers are done.
    RunCompleted { summary: RunSummary },
}

/// Knobs for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Worker pool size per barrier. Zero is treated as one.
    pub concurrency: usize,
    pub max_fix_rounds: u32,
    pub terminal_failed: bool,
    pub artifact_path: String,
    pub branch_prefix: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_fix_rounds: MAX_ROUNDS,
            terminal_failed: true,
            artifact_path: "Example.java".to_string(),
            branch_prefix: "feature".to_string(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &IssueflowToml) -> Self {
        Self {
            concurrency: config.pipeline.concurrency,
            max_fix_rounds: config.pipeline.max_fix_rounds,
            terminal_failed: config.pipeline.terminal_failed,
            artifact_path: config.pipeline.artifact_path.clone(),
            branch_prefix: config.scm.branch_prefix.clone(),
        }
    }
}

/// What a unit of work hands back to its barrier.
enum UnitResult {
    /// The issue moves on to the next stage.
    Advanced(Task),
    /// The issue is done, successfully or not.
    Finished(IssueOutcome),
}

impl UnitResult {
    fn advanced(&self) -> bool {
        match self {
            UnitResult::Advanced(_) => true,
            UnitResult::Finished(outcome) => outcome.is_success(),
        }
    }

    fn issue_id(&self) -> &str {
        match self {
            UnitResult::Advanced(task) => &task.issue_id,
            UnitResult::Finished(outcome) => &outcome.issue_id,
        }
    }
}

/// Turn a stage error into the failed outcome for its issue.
fn stage_failure(err: StageError) -> IssueOutcome {
    let stage = err.stage;
    let message = err.source.to_string();
    tracing::warn!(issue_id = %err.task.issue_id, %stage, error = %message, "stage failed");

    let mut task = err.into_task();
    let logs = task
        .test_result
        .as_ref()
        .zip(task.analysis_result.as_ref())
        .map(|(tests, analysis)| ReviewLogs::capture(tests, analysis));
    if !task.state_machine.current().is_some_and(IssueState::is_terminal) {
        task.state_machine.transition(IssueState::Failed);
    }
    IssueOutcome::failed(task, stage, message, logs)
}

pub struct PipelineOrchestrator {
    stages: Arc<StageRunner>,
    autofix: AutoFixLoop,
    concurrency: usize,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl PipelineOrchestrator {
    pub fn new(caps: Capabilities, settings: PipelineSettings) -> Self {
        let stages = StageRunner::new(caps, settings.artifact_path, settings.branch_prefix);
        Self {
            stages: Arc::new(stages),
            autofix: AutoFixLoop::new(settings.max_fix_rounds, settings.terminal_failed),
            concurrency: settings.concurrency.max(1),
            event_tx: None,
        }
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Fetch the issues assigned to `assignee` and run them through the pipeline.
    ///
    /// Only the initial listing can fail the run; per-issue failures are
    /// reported in the returned outcomes.
    pub async fn run(&self, assignee: &str) -> Result<Vec<IssueOutcome>, PipelineError> {
        let issues = self
            .stages
            .capabilities()
            .tracker
            .list_assigned(assignee)
            .await
            .map_err(|source| PipelineError::ListIssues {
                assignee: assignee.to_string(),
                source,
            })?;
        Ok(self.run_issues(issues).await)
    }

    /// Run a batch through the three barriers. Outcomes come back in completion
    /// order, one per issue.
    pub async fn run_issues(&self, issues: Vec<Issue>) -> Vec<IssueOutcome> {
        tracing::info!(issues = issues.len(), concurrency = self.concurrency, "starting pipeline run");
        let mut outcomes = Vec::with_capacity(issues.len());

        let planned = {
            let inputs = issues
                .into_iter()
                .map(|issue| {
                    let machine = IssueStateMachine::new(issue.id.clone());
                    (issue.id.clone(), (issue, machine))
                })
                .collect();
            let stages = self.stages.clone();
            let results = self
                .barrier(Stage::Plan, inputs, move |(issue, machine): (Issue, IssueStateMachine)| {
                    let stages = stages.clone();
                    async move {
                        match stages.plan(&issue, machine).await {
                            Ok(task) => UnitResult::Advanced(task),
                            Err(e) => UnitResult::Finished(stage_failure(e)),
                        }
                    }
                })
                .await;
            split(results, &mut outcomes)
        };

        let coded = {
            let inputs = planned.into_iter().map(|t| (t.issue_id.clone(), t)).collect();
            let stages = self.stages.clone();
            let results = self
                .barrier(Stage::Code, inputs, move |task: Task| {
                    let stages = stages.clone();
                    async move {
                        match stages.code(task).await {
                            Ok(task) => UnitResult::Advanced(task),
                            Err(e) => UnitResult::Finished(stage_failure(e)),
                        }
                    }
                })
                .await;
            split(results, &mut outcomes)
        };

        {
            let inputs = coded.into_iter().map(|t| (t.issue_id.clone(), t)).collect();
            let stages = self.stages.clone();
            let autofix = self.autofix;
            let results = self
                .barrier(Stage::Review, inputs, move |task: Task| {
                    let stages = stages.clone();
                    async move {
                        let outcome = match autofix.run(&stages, task).await {
                            Ok(StageOutcome::Success(task)) => IssueOutcome::succeeded(task),
                            Ok(StageOutcome::Failure { reason, logs, task }) => {
                                IssueOutcome::failed(task, Stage::Review, reason, logs)
                            }
                            Err(e) => stage_failure(e),
                        };
                        UnitResult::Finished(outcome)
                    }
                })
                .await;
            // Review never advances a task further.
            let leftover = split(results, &mut outcomes);
            debug_assert!(leftover.is_empty());
        }

        let summary = RunSummary::from_outcomes(&outcomes);
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "pipeline run finished"
        );
        self.emit(PipelineEvent::RunCompleted { summary }).await;
        outcomes
    }

    /// Dispatch one unit per input onto the worker pool and wait for all of them.
    ///
    /// Results arrive in completion order. A unit that never reports (its task
    /// panicked) yields a failed outcome for its issue.
    async fn barrier<I, F, Fut>(
        &self,
        stage: Stage,
        inputs: Vec<(String, I)>,
        work: F,
    ) -> Vec<UnitResult>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = UnitResult> + Send + 'static,
    {
        let units = inputs.len();
        tracing::info!(%stage, units, "barrier started");
        self.emit(PipelineEvent::BarrierStarted { stage, units }).await;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, UnitResult)>(units.max(1));

        let mut issue_ids = Vec::with_capacity(units);
        let mut handles = Vec::with_capacity(units);
        for (slot, (issue_id, input)) in inputs.into_iter().enumerate() {
            issue_ids.push(issue_id);
            let unit = work(input);
            let semaphore = semaphore.clone();
            let result_tx = result_tx.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = unit.await;
                result_tx.send((slot, result)).await.ok();
            }));
        }
        drop(result_tx);

        let mut reported = vec![false; units];
        let mut results = Vec::with_capacity(units);
        while let Some((slot, result)) = result_rx.recv().await {
            reported[slot] = true;
            self.emit(PipelineEvent::UnitFinished {
                stage,
                issue_id: result.issue_id().to_string(),
                advanced: result.advanced(),
            })
            .await;
            results.push(result);
        }

        for (slot, handle) in handles.into_iter().enumerate() {
            let joined = handle.await;
            if reported[slot] {
                continue;
            }
            let reason = match joined {
                Err(e) => format!("{stage} worker aborted: {e}"),
                Ok(()) => format!("{stage} worker exited without a result"),
            };
            let issue_id = &issue_ids[slot];
            tracing::warn!(%issue_id, %stage, %reason, "unit lost");
            let outcome = IssueOutcome::aborted(issue_id, stage, reason);
            self.emit(PipelineEvent::UnitFinished {
                stage,
                issue_id: issue_id.clone(),
                advanced: false,
            })
            .await;
            results.push(UnitResult::Finished(outcome));
        }

        let advanced = results.iter().filter(|r| r.advanced()).count();
        let failed = results.len() - advanced;
        tracing::info!(%stage, advanced, failed, "barrier completed");
        self.emit(PipelineEvent::BarrierCompleted {
            stage,
            advanced,
            failed,
        })
        .await;
        results
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}

/// Separate advancing tasks from finished outcomes.
fn split(results: Vec<UnitResult>, outcomes: &mut Vec<IssueOutcome>) -> Vec<Task> {
    let mut tasks = Vec::new();
    for result in results {
        match result {
            UnitResult::Advanced(task) => tasks.push(task),
            UnitResult::Finished(outcome) => outcomes.push(outcome),
        }
    }
    tasks
}
