//! The issue-resolution pipeline.
//!
//! Issues flow through three stages, each run as a barrier across the whole batch:
//!
//! 1. **Plan**: ask the text generator for a plan (`Planned`)
//! 2. **Code**: check out a branch, write the artifact, run the tests (`Coded`)
//! 3. **Review**: scan the workspace and open a merge request (`PrCreated`), or
//!    run bounded correction rounds through [`AutoFixLoop`]
//!
//! Every issue owns its [`Task`] and [`IssueStateMachine`] exclusively; the
//! [`PipelineOrchestrator`] moves them between stages by value.

pub mod autofix;
pub mod orchestrator;
pub mod prompts;
pub mod stages;
pub mod state;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use autofix::{AutoFixLoop, MAX_ROUNDS};
pub use orchestrator::{PipelineEvent, PipelineOrchestrator, PipelineSettings};
pub use stages::StageRunner;
pub use state::{IssueState, IssueStateMachine};
pub use task::{
    AnalysisReport, Issue, IssueOutcome, ReviewLogs, Stage, StageOutcome, Task, TestReport,
    WorkflowStatus, WorkspaceHandle,
};
