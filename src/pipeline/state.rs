//! Per-issue lifecycle state and transition history.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::InvalidStateError;

/// Lifecycle state of one issue inside a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    /// A plan has been generated.
    Planned,
    /// Code was written to a fresh workspace and tests ran once.
    Coded,
    /// A review pass has started.
    Reviewed,
    /// The last review failed; a correction round is pending or in progress.
    #[serde(rename = "auto_fix")]
    AutoFixing,
    /// A merge request was opened.
    PrCreated,
    /// Automation stopped without a merge request.
    Failed,
}

impl IssueState {
    pub const ALL: [IssueState; 6] = [
        IssueState::Planned,
        IssueState::Coded,
        IssueState::Reviewed,
        IssueState::AutoFixing,
        IssueState::PrCreated,
        IssueState::Failed,
    ];

    /// Canonical name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            IssueState::Planned => "planned",
            IssueState::Coded => "coded",
            IssueState::Reviewed => "reviewed",
            IssueState::AutoFixing => "auto_fix",
            IssueState::PrCreated => "pr_created",
            IssueState::Failed => "failed",
        }
    }

    /// Check if no further stage will run after this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, IssueState::PrCreated | IssueState::Failed)
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueState {
    type Err = InvalidStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planned" => Ok(IssueState::Planned),
            "coded" => Ok(IssueState::Coded),
            "reviewed" => Ok(IssueState::Reviewed),
            "auto_fix" | "auto_fixing" => Ok(IssueState::AutoFixing),
            "pr_created" => Ok(IssueState::PrCreated),
            "failed" => Ok(IssueState::Failed),
            _ => Err(InvalidStateError(s.to_string())),
        }
    }
}

/// Tracks one issue's current state and every state it has entered.
///
/// Any state may follow any other; the machine only guarantees membership and
/// an append-only history. It is owned by whichever unit of work is processing
/// the issue, so it needs no interior synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStateMachine {
    issue_id: String,
    current: Option<IssueState>,
    history: Vec<IssueState>,
}

impl IssueStateMachine {
    pub fn new(issue_id: impl Into<String>) -> Self {
        Self {
            issue_id: issue_id.into(),
            current: None,
            history: Vec::new(),
        }
    }

    pub fn issue_id(&self) -> &str {
        &self.issue_id
    }

    /// Enter `target`, recording it as current state and appending it to history.
    pub fn transition(&mut self, target: IssueState) {
        tracing::debug!(issue_id = %self.issue_id, from = ?self.current, to = %target, "state transition");
        self.current = Some(target);
        self.history.push(target);
    }

    /// Enter a state given by name.
    ///
    /// Unknown names fail with [`InvalidStateError`] and leave the machine untouched.
    pub fn transition_named(&mut self, target: &str) -> Result<IssueState, InvalidStateError> {
        let state = target.parse::<IssueState>()?;
        self.transition(state);
        Ok(state)
    }

    /// The active state, or `None` before the first transition.
    pub fn current(&self) -> Option<IssueState> {
        self.current
    }

    /// Every state entered so far, in order, duplicates included.
    pub fn history(&self) -> &[IssueState] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_machine_is_unset() {
        let machine = IssueStateMachine::new("PROJ-1");
        assert_eq!(machine.issue_id(), "PROJ-1");
        assert_eq!(machine.current(), None);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_transition_records_current_and_history() {
        let mut machine = IssueStateMachine::new("PROJ-1");
        machine.transition(IssueState::Planned);
        machine.transition(IssueState::Coded);

        assert_eq!(machine.current(), Some(IssueState::Coded));
        assert_eq!(machine.history(), &[IssueState::Planned, IssueState::Coded]);
    }

    #[test]
    fn test_any_state_may_follow_any_state() {
        let mut machine = IssueStateMachine::new("PROJ-1");
        machine.transition(IssueState::PrCreated);
        machine.transition(IssueState::Planned);
        machine.transition(IssueState::Failed);
        machine.transition(IssueState::Coded);
        assert_eq!(machine.history().len(), 4);
        assert_eq!(machine.current(), Some(IssueState::Coded));
    }

    #[test]
    fn test_history_keeps_duplicates() {
        let mut machine = IssueStateMachine::new("PROJ-1");
        machine.transition(IssueState::Reviewed);
        machine.transition(IssueState::AutoFixing);
        machine.transition(IssueState::AutoFixing);
        assert_eq!(
            machine.history(),
            &[IssueState::Reviewed, IssueState::AutoFixing, IssueState::AutoFixing]
        );
    }

    #[test]
    fn test_history_length_matches_transitions_requested() {
        let mut machine = IssueStateMachine::new("PROJ-1");
        for (i, state) in IssueState::ALL.iter().cycle().take(13).enumerate() {
            machine.transition(*state);
            assert_eq!(machine.history().len(), i + 1);
        }
    }

    #[test]
    fn test_reading_history_has_no_side_effects() {
        let mut machine = IssueStateMachine::new("PROJ-1");
        machine.transition(IssueState::Planned);
        let first = machine.history().to_vec();
        let second = machine.history().to_vec();
        assert_eq!(first, second);
        assert_eq!(machine.current(), machine.current());
    }

    #[test]
    fn test_replaying_same_calls_is_deterministic() {
        let calls = [
            IssueState::Planned,
            IssueState::Coded,
            IssueState::Reviewed,
            IssueState::AutoFixing,
        ];
        let mut a = IssueStateMachine::new("PROJ-1");
        let mut b = IssueStateMachine::new("PROJ-1");
        for state in calls {
            a.transition(state);
            b.transition(state);
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_transition_named_accepts_known_states() {
        let mut machine = IssueStateMachine::new("PROJ-1");
        assert_eq!(machine.transition_named("planned"), Ok(IssueState::Planned));
        assert_eq!(machine.transition_named("auto_fix"), Ok(IssueState::AutoFixing));
        assert_eq!(machine.transition_named(" PR_CREATED "), Ok(IssueState::PrCreated));
        assert_eq!(machine.history().len(), 3);
    }

    #[test]
    fn test_transition_named_rejects_unknown_state_without_side_effect() {
        let mut machine = IssueStateMachine::new("PROJ-1");
        machine.transition(IssueState::Planned);

        for bogus in ["merged", "", "plan", "in_review"] {
            let err = machine.transition_named(bogus).unwrap_err();
            assert_eq!(err, InvalidStateError(bogus.to_string()));
        }

        assert_eq!(machine.history(), &[IssueState::Planned]);
        assert_eq!(machine.current(), Some(IssueState::Planned));
    }

    #[test]
    fn test_state_names_round_trip() {
        for state in IssueState::ALL {
            assert_eq!(state.as_str().parse::<IssueState>(), Ok(state));
        }
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&IssueState::AutoFixing).unwrap();
        assert_eq!(json, "\"auto_fix\"");
        let json = serde_json::to_string(&IssueState::PrCreated).unwrap();
        assert_eq!(json, "\"pr_created\"");
    }

    #[test]
    fn test_terminal_states() {
        assert!(IssueState::PrCreated.is_terminal());
        assert!(IssueState::Failed.is_terminal());
        assert!(!IssueState::AutoFixing.is_terminal());
        assert!(!IssueState::Planned.is_terminal());
    }
}
