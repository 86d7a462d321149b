//! Bounded review/correct retry loop.

use super::stages::StageRunner;
use super::state::IssueState;
use super::task::{StageOutcome, Task};
use crate::errors::{RetryBudgetExhausted, StageError};

/// Default number of correction rounds before the final review.
pub const MAX_ROUNDS: u32 = 3;

/// Drives review until it passes or the correction budget runs out.
///
/// Up to `max_rounds` reviews may each be followed by a correction round; one
/// final review is then made regardless, so review runs between 1 and
/// `max_rounds + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFixLoop {
    pub max_rounds: u32,
    /// Record `Failed` when the final review still does not pass.
    pub terminal_failed: bool,
}

impl Default for AutoFixLoop {
    fn default() -> Self {
        Self {
            max_rounds: MAX_ROUNDS,
            terminal_failed: true,
        }
    }
}

impl AutoFixLoop {
    pub fn new(max_rounds: u32, terminal_failed: bool) -> Self {
        Self {
            max_rounds,
            terminal_failed,
        }
    }

    pub async fn run(&self, stages: &StageRunner, mut task: Task) -> Result<StageOutcome, StageError> {
        for round in 1..=self.max_rounds {
            let (reason, logs) = match stages.review(task).await? {
                StageOutcome::Success(task) => return Ok(StageOutcome::Success(task)),
                StageOutcome::Failure { reason, logs, task: failed } => {
                    task = failed;
                    (reason, logs.unwrap_or_default())
                }
            };
            tracing::info!(
                issue_id = %task.issue_id,
                round,
                max_rounds = self.max_rounds,
                %reason,
                "auto-fix round"
            );
            task = stages.correct(task, &logs).await?;
        }

        match stages.review(task).await? {
            StageOutcome::Success(task) => Ok(StageOutcome::Success(task)),
            StageOutcome::Failure { reason, logs, mut task } => {
                let exhausted = RetryBudgetExhausted {
                    issue_id: task.issue_id.clone(),
                    rounds: task.fix_rounds,
                };
                tracing::warn!(issue_id = %task.issue_id, %reason, "{exhausted}");
                if self.terminal_failed {
                    task.state_machine.transition(IssueState::Failed);
                }
                Ok(StageOutcome::Failure {
                    reason: format!("{exhausted}: {reason}"),
                    logs,
                    task,
                })
            }
        }
    }
}
