//! Typed error hierarchy for the issueflow pipeline.
//!
//! - `CapabilityError`: any failed call to an external capability
//! - `InvalidStateError`: a state machine was given an unknown target
//! - `RetryBudgetExhausted`: the auto-fix loop ran out of rounds
//! - `StageError`: a stage aborted; carries the partial task it was working on
//! - `PipelineError`: run-level failures surfaced to the caller

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::{Stage, Task};

/// The external capability a call was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    IssueTracker,
    SourceControl,
    BuildRunner,
    StaticAnalyzer,
    TextGenerator,
    Filesystem,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityKind::IssueTracker => "issue tracker",
            CapabilityKind::SourceControl => "source control",
            CapabilityKind::BuildRunner => "build runner",
            CapabilityKind::StaticAnalyzer => "static analyzer",
            CapabilityKind::TextGenerator => "text generator",
            CapabilityKind::Filesystem => "filesystem",
        };
        f.write_str(name)
    }
}

/// Failure of a single external capability call.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{capability} is not configured: {reason}")]
    NotConfigured {
        capability: CapabilityKind,
        reason: String,
    },

    #[error("{capability} request failed: {source}")]
    Http {
        capability: CapabilityKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{capability} returned HTTP {status}: {body}")]
    Status {
        capability: CapabilityKind,
        status: u16,
        body: String,
    },

    #[error("Failed to run `{program}` for {capability}: {source}")]
    Spawn {
        capability: CapabilityKind,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` failed for {capability} (exit code {code:?}): {stderr}")]
    CommandFailed {
        capability: CapabilityKind,
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Filesystem operation failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{capability} returned an unexpected response: {message}")]
    Protocol {
        capability: CapabilityKind,
        message: String,
    },
}

impl CapabilityError {
    /// Which capability produced this error.
    pub fn capability(&self) -> CapabilityKind {
        match self {
            CapabilityError::NotConfigured { capability, .. }
            | CapabilityError::Http { capability, .. }
            | CapabilityError::Status { capability, .. }
            | CapabilityError::Spawn { capability, .. }
            | CapabilityError::CommandFailed { capability, .. }
            | CapabilityError::Protocol { capability, .. } => *capability,
            CapabilityError::Io { .. } => CapabilityKind::Filesystem,
        }
    }

    pub fn http(capability: CapabilityKind, source: reqwest::Error) -> Self {
        CapabilityError::Http { capability, source }
    }

    pub fn protocol(capability: CapabilityKind, message: impl Into<String>) -> Self {
        CapabilityError::Protocol {
            capability,
            message: message.into(),
        }
    }
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// A state machine was asked to enter a state that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid state: {0}")]
pub struct InvalidStateError(pub String);

/// The auto-fix loop used every round without producing a passing review.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Auto-fix budget exhausted for issue {issue_id} after {rounds} round(s)")]
pub struct RetryBudgetExhausted {
    pub issue_id: String,
    pub rounds: u32,
}

/// A stage aborted because one of its capability calls failed.
///
/// The partial task travels with the error so the orchestrator can still report
/// the issue's history and whatever artifacts the earlier stages produced.
#[derive(Debug, Error)]
#[error("{stage} stage failed for issue {}: {source}", task.issue_id)]
pub struct StageError {
    pub stage: Stage,
    pub task: Box<Task>,
    #[source]
    pub source: CapabilityError,
}

impl StageError {
    pub fn new(stage: Stage, task: Task, source: CapabilityError) -> Self {
        Self {
            stage,
            task: Box::new(task),
            source,
        }
    }

    pub fn into_task(self) -> Task {
        *self.task
    }
}

/// Run-level errors returned by the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to list issues assigned to {assignee}: {source}")]
    ListIssues {
        assignee: String,
        #[source]
        source: CapabilityError,
    },
}
