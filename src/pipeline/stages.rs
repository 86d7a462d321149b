//! The three pipeline stages plus the correction step used by the auto-fix loop.
//!
//! Each stage takes ownership of the issue's [`Task`], makes its capability calls
//! and hands the task back. A capability failure comes back as a [`StageError`]
//! carrying the partial task; nothing is retried here.

use std::path::PathBuf;

use super::prompts;
use super::state::{IssueState, IssueStateMachine};
use super::task::{Issue, ReviewLogs, Stage, StageOutcome, Task, TestReport, WorkspaceHandle};
use crate::capabilities::Capabilities;
use crate::config::is_workspace_relative;
use crate::errors::{CapabilityError, CapabilityResult, StageError};

/// Random suffix length appended to branch names.
const BRANCH_SUFFIX_LEN: usize = 6;

/// Branch for `issue_id`: `{prefix}/{issue_id}-{suffix}`, unique per call.
pub fn branch_name(prefix: &str, issue_id: &str) -> String {
    let safe_id: String = issue_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}/{}-{}", prefix, safe_id, &suffix[..BRANCH_SUFFIX_LEN])
}

/// Runs stage logic against an injected set of capabilities.
pub struct StageRunner {
    caps: Capabilities,
    artifact_path: PathBuf,
    branch_prefix: String,
}

impl StageRunner {
    pub fn new(
        caps: Capabilities,
        artifact_path: impl Into<PathBuf>,
        branch_prefix: impl Into<String>,
    ) -> Self {
        Self {
            caps,
            artifact_path: artifact_path.into(),
            branch_prefix: branch_prefix.into(),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Where the artifact lives inside `workspace`. Paths that would land
    /// outside the workspace are refused.
    fn artifact_in(&self, workspace: &WorkspaceHandle) -> CapabilityResult<PathBuf> {
        if !is_workspace_relative(&self.artifact_path) {
            return Err(CapabilityError::Io {
                path: self.artifact_path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "artifact path must stay inside the workspace",
                ),
            });
        }
        Ok(workspace.path.join(&self.artifact_path))
    }

    /// Generate a plan for `issue` and create its task.
    pub async fn plan(
        &self,
        issue: &Issue,
        state_machine: IssueStateMachine,
    ) -> Result<Task, StageError> {
        tracing::debug!(issue_id = %issue.id, "plan stage");
        let mut task = Task::new(issue, state_machine);

        let plan = match self
            .caps
            .generator
            .generate(&prompts::plan_prompt(&issue.summary))
            .await
        {
            Ok(plan) => plan,
            Err(e) => return Err(StageError::new(Stage::Plan, task, e)),
        };

        task.plan = Some(plan);
        task.state_machine.transition(IssueState::Planned);
        tracing::info!(issue_id = %task.issue_id, "planned");
        Ok(task)
    }

    /// Check out a fresh branch, write the generated artifact and run the tests once.
    pub async fn code(&self, mut task: Task) -> Result<Task, StageError> {
        let branch = branch_name(&self.branch_prefix, &task.issue_id);
        tracing::debug!(issue_id = %task.issue_id, %branch, "code stage");

        let workspace = match self.caps.source_control.create_workspace(&branch).await {
            Ok(workspace) => workspace,
            Err(e) => return Err(StageError::new(Stage::Code, task, e)),
        };
        task.workspace = Some(workspace.clone());
        let artifact = match self.artifact_in(&workspace) {
            Ok(artifact) => artifact,
            Err(e) => return Err(StageError::new(Stage::Code, task, e)),
        };

        let contents = prompts::initial_artifact(&task.issue_id, task.plan_text());
        if let Err(e) = self.caps.filesystem.write_file(&artifact, &contents).await {
            return Err(StageError::new(Stage::Code, task, e));
        }

        match self.caps.build_runner.run_tests(&workspace).await {
            Ok(report) => task.test_result = Some(report),
            Err(e) => return Err(StageError::new(Stage::Code, task, e)),
        }

        task.state_machine.transition(IssueState::Coded);
        tracing::info!(
            issue_id = %task.issue_id,
            tests_passed = task.test_result.as_ref().is_some_and(|t| t.passed),
            "coded"
        );
        Ok(task)
    }

    /// One review pass: scan the workspace, then either open a merge request or
    /// report the captured logs as a failure.
    pub async fn review(&self, mut task: Task) -> Result<StageOutcome, StageError> {
        task.review_attempts += 1;
        task.analysis_result = None;
        task.state_machine.transition(IssueState::Reviewed);
        tracing::debug!(issue_id = %task.issue_id, attempt = task.review_attempts, "review stage");

        let Some(workspace) = task.workspace.clone() else {
            task.state_machine.transition(IssueState::AutoFixing);
            return Ok(StageOutcome::Failure {
                reason: "no workspace to review".to_string(),
                logs: None,
                task,
            });
        };

        let analysis = match self.caps.analyzer.scan(&workspace).await {
            Ok(report) => report,
            Err(e) => return Err(StageError::new(Stage::Review, task, e)),
        };
        let tests = task.test_result.clone().unwrap_or_default();
        task.analysis_result = Some(analysis.clone());

        if tests.passed && analysis.passed {
            let title = format!("Auto PR for {}", task.issue_id);
            let body = format!("Plan:\n{}", task.plan_text());
            let pr = match self
                .caps
                .source_control
                .open_merge_request(&workspace.branch_name, &title, &body)
                .await
            {
                Ok(pr) => pr,
                Err(e) => return Err(StageError::new(Stage::Review, task, e)),
            };
            task.pr_reference = Some(pr.clone());

            let comment = format!("PR created: {pr}");
            if let Err(e) = self.caps.tracker.post_comment(&task.issue_id, &comment).await {
                tracing::warn!(issue_id = %task.issue_id, error = %e, "failed to post status comment");
            }

            task.state_machine.transition(IssueState::PrCreated);
            tracing::info!(issue_id = %task.issue_id, %pr, "merge request opened");
            return Ok(StageOutcome::Success(task));
        }

        let reason = match (tests.passed, analysis.passed) {
            (false, false) => "tests and static analysis failed",
            (false, true) => "tests failed",
            _ => "static analysis failed",
        };
        let logs = ReviewLogs::capture(&tests, &analysis);
        task.state_machine.transition(IssueState::AutoFixing);
        tracing::info!(issue_id = %task.issue_id, reason, "review failed");
        Ok(StageOutcome::Failure {
            reason: reason.to_string(),
            logs: Some(logs),
            task,
        })
    }

    /// One correction round: regenerate the artifact from the plan and the failed
    /// review's logs, then re-run the tests.
    pub async fn correct(&self, mut task: Task, logs: &ReviewLogs) -> Result<Task, StageError> {
        let Some(workspace) = task.workspace.clone() else {
            // Nothing to rewrite; the next review reports the missing workspace.
            return Ok(task);
        };

        let prompt = prompts::fix_prompt(task.plan_text(), logs);
        let code = match self.caps.generator.generate(&prompt).await {
            Ok(code) => code,
            Err(e) => return Err(StageError::new(Stage::Review, task, e)),
        };

        let artifact = match self.artifact_in(&workspace) {
            Ok(artifact) => artifact,
            Err(e) => return Err(StageError::new(Stage::Review, task, e)),
        };
        if let Err(e) = self.caps.filesystem.write_file(&artifact, &code).await {
            return Err(StageError::new(Stage::Review, task, e));
        }

        let report: TestReport = match self.caps.build_runner.run_tests(&workspace).await {
            Ok(report) => report,
            Err(e) => return Err(StageError::new(Stage::Review, task, e)),
        };
        task.test_result = Some(report);
        task.fix_rounds += 1;
        task.state_machine.transition(IssueState::AutoFixing);
        Ok(task)
    }
}
