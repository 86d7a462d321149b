//! Data threaded through the pipeline: issues, per-issue tasks and outcomes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::state::{IssueState, IssueStateMachine};

/// A work item pulled from the issue tracker. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub summary: String,
}

impl Issue {
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
        }
    }
}

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Code,
    Review,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Plan => write!(f, "Plan"),
            Stage::Code => write!(f, "Code"),
            Stage::Review => write!(f, "Review"),
        }
    }
}

/// A checked-out branch the code stage writes into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceHandle {
    pub branch_name: String,
    pub path: PathBuf,
}

/// Result of one build/test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    /// Total tests executed, when the runner reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_total: Option<u32>,
    /// Tests that neither failed nor errored, when the runner reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_passed: Option<u32>,
}

impl TestReport {
    pub fn new(passed: bool, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            passed,
            stdout: stdout.into(),
            stderr: stderr.into(),
            tests_total: None,
            tests_passed: None,
        }
    }

    pub fn with_counts(mut self, total: u32, passed: u32) -> Self {
        self.tests_total = Some(total);
        self.tests_passed = Some(passed.min(total));
        self
    }
}

/// Result of one static-analysis scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub passed: bool,
    pub logs: String,
    /// 0-100 quality score, when the scanner reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u8>,
}

impl AnalysisReport {
    pub fn new(passed: bool, logs: impl Into<String>) -> Self {
        Self {
            passed,
            logs: logs.into(),
            quality_score: None,
        }
    }

    pub fn with_score(mut self, score: u8) -> Self {
        self.quality_score = Some(score.min(100));
        self
    }
}

/// Logs captured from a failed review, fed into the correction prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewLogs {
    pub test_stdout: String,
    pub test_stderr: String,
    pub analysis_logs: String,
}

impl ReviewLogs {
    pub fn capture(tests: &TestReport, analysis: &AnalysisReport) -> Self {
        Self {
            test_stdout: tests.stdout.clone(),
            test_stderr: tests.stderr.clone(),
            analysis_logs: analysis.logs.clone(),
        }
    }
}

/// Working record for one issue, created by the plan stage and filled in as
/// later stages complete. Exactly one unit of work owns it at a time.
#[derive(Debug, Clone)]
pub struct Task {
    pub issue_id: String,
    pub summary: String,
    pub plan: Option<String>,
    pub workspace: Option<WorkspaceHandle>,
    pub test_result: Option<TestReport>,
    pub analysis_result: Option<AnalysisReport>,
    pub pr_reference: Option<String>,
    /// Correction rounds applied by the auto-fix loop.
    pub fix_rounds: u32,
    /// Review passes started, including the final one after an exhausted loop.
    pub review_attempts: u32,
    pub state_machine: IssueStateMachine,
}

impl Task {
    pub fn new(issue: &Issue, state_machine: IssueStateMachine) -> Self {
        Self {
            issue_id: issue.id.clone(),
            summary: issue.summary.clone(),
            plan: None,
            workspace: None,
            test_result: None,
            analysis_result: None,
            pr_reference: None,
            fix_rounds: 0,
            review_attempts: 0,
            state_machine,
        }
    }

    pub fn plan_text(&self) -> &str {
        self.plan.as_deref().unwrap_or_default()
    }

    pub fn branch_name(&self) -> Option<&str> {
        self.workspace.as_ref().map(|w| w.branch_name.as_str())
    }
}

/// Tagged result of a stage invocation.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Success(Task),
    Failure {
        reason: String,
        logs: Option<ReviewLogs>,
        task: Task,
    },
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success(_))
    }

    pub fn task(&self) -> &Task {
        match self {
            StageOutcome::Success(task) | StageOutcome::Failure { task, .. } => task,
        }
    }

    pub fn into_task(self) -> Task {
        match self {
            StageOutcome::Success(task) | StageOutcome::Failure { task, .. } => task,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Success,
    Failed,
}

/// Final per-issue record handed to the reporting layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueOutcome {
    pub issue_id: String,
    pub final_state: Option<IssueState>,
    pub history: Vec<IssueState>,
    pub workflow_status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    pub merge_request: Option<String>,
    pub tests_passed: u32,
    pub tests_total: u32,
    pub analysis_score: Option<u8>,
    pub auto_fix_rounds: u32,
    pub review_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<ReviewLogs>,
}

impl IssueOutcome {
    /// Outcome of an issue whose review opened a merge request.
    pub fn succeeded(task: Task) -> Self {
        Self::from_task(task, WorkflowStatus::Success, None, None, None)
    }

    /// Outcome of an issue that stopped in `stage`.
    pub fn failed(task: Task, stage: Stage, error: String, logs: Option<ReviewLogs>) -> Self {
        Self::from_task(task, WorkflowStatus::Failed, Some(stage), Some(error), logs)
    }

    /// Outcome of an issue whose worker never reported back; its task is gone.
    pub fn aborted(issue_id: &str, stage: Stage, message: String) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            final_state: None,
            history: Vec::new(),
            workflow_status: WorkflowStatus::Failed,
            failed_stage: Some(stage),
            error: Some(message),
            plan: None,
            branch_name: None,
            merge_request: None,
            tests_passed: 0,
            tests_total: 0,
            analysis_score: None,
            auto_fix_rounds: 0,
            review_attempts: 0,
            logs: None,
        }
    }

    fn from_task(
        task: Task,
        workflow_status: WorkflowStatus,
        failed_stage: Option<Stage>,
        error: Option<String>,
        logs: Option<ReviewLogs>,
    ) -> Self {
        let (tests_passed, tests_total) = task
            .test_result
            .as_ref()
            .map(|t| (t.tests_passed.unwrap_or(0), t.tests_total.unwrap_or(0)))
            .unwrap_or((0, 0));
        let branch_name = task.branch_name().map(str::to_string);

        Self {
            issue_id: task.issue_id,
            final_state: task.state_machine.current(),
            history: task.state_machine.history().to_vec(),
            workflow_status,
            failed_stage,
            error,
            plan: task.plan,
            branch_name,
            merge_request: task.pr_reference,
            tests_passed,
            tests_total,
            analysis_score: task.analysis_result.and_then(|a| a.quality_score),
            auto_fix_rounds: task.fix_rounds,
            review_attempts: task.review_attempts,
            logs,
        }
    }

    pub fn is_success(&self) -> bool {
        self.workflow_status == WorkflowStatus::Success
    }
}
