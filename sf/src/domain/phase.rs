//! Workflow phases and the transition graph

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A discrete named stage of the workflow state machine
///
/// ```text
/// INIT -> CONTEXT_LOADED -> PLAN_READY -> TASKS_READY -> AWAITING_APPROVAL
/// AWAITING_APPROVAL -> APPROVED -> IMPLEMENTED
/// AWAITING_APPROVAL -> REJECTED
/// any non-terminal  -> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Init,
    ContextLoaded,
    PlanReady,
    TasksReady,
    AwaitingApproval,
    Approved,
    Rejected,
    Implemented,
    Failed,
}

impl Phase {
    /// Every phase, in declaration order
    pub const ALL: [Phase; 9] = [
        Phase::Init,
        Phase::ContextLoaded,
        Phase::PlanReady,
        Phase::TasksReady,
        Phase::AwaitingApproval,
        Phase::Approved,
        Phase::Rejected,
        Phase::Implemented,
        Phase::Failed,
    ];

    /// Terminal phases accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Implemented | Phase::Rejected | Phase::Failed)
    }

    /// Phases directly reachable from this one
    pub fn successors(self) -> &'static [Phase] {
        match self {
            Phase::Init => &[Phase::ContextLoaded, Phase::Failed],
            Phase::ContextLoaded => &[Phase::PlanReady, Phase::Failed],
            Phase::PlanReady => &[Phase::TasksReady, Phase::Failed],
            Phase::TasksReady => &[Phase::AwaitingApproval, Phase::Failed],
            Phase::AwaitingApproval => &[Phase::Approved, Phase::Rejected, Phase::Failed],
            Phase::Approved => &[Phase::Implemented, Phase::Failed],
            Phase::Rejected | Phase::Implemented | Phase::Failed => &[],
        }
    }

    /// Whether `next` is an edge of the state machine from `self`
    pub fn can_transition_to(self, next: Phase) -> bool {
        let allowed = self.successors().contains(&next);
        debug!(from = %self, to = %next, allowed, "Phase::can_transition_to: called");
        allowed
    }

    /// Position along the forward path, `None` for FAILED
    ///
    /// REJECTED shares its rank with APPROVED: both sit one step past the gate.
    pub fn rank(self) -> Option<u8> {
        match self {
            Phase::Init => Some(0),
            Phase::ContextLoaded => Some(1),
            Phase::PlanReady => Some(2),
            Phase::TasksReady => Some(3),
            Phase::AwaitingApproval => Some(4),
            Phase::Approved | Phase::Rejected => Some(5),
            Phase::Implemented => Some(6),
            Phase::Failed => None,
        }
    }

    /// Whether this phase is at or beyond `marker` on the forward path
    pub fn has_passed(self, marker: Phase) -> bool {
        match (self.rank(), marker.rank()) {
            (Some(current), Some(marker_rank)) => {
                // REJECTED never passes APPROVED or IMPLEMENTED
                if self == Phase::Rejected && matches!(marker, Phase::Approved | Phase::Implemented) {
                    return false;
                }
                current >= marker_rank
            }
            _ => false,
        }
    }

    /// Canonical upper-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::ContextLoaded => "CONTEXT_LOADED",
            Phase::PlanReady => "PLAN_READY",
            Phase::TasksReady => "TASKS_READY",
            Phase::AwaitingApproval => "AWAITING_APPROVAL",
            Phase::Approved => "APPROVED",
            Phase::Rejected => "REJECTED",
            Phase::Implemented => "IMPLEMENTED",
            Phase::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_forward_path() {
        assert!(Phase::Init.can_transition_to(Phase::ContextLoaded));
        assert!(Phase::ContextLoaded.can_transition_to(Phase::PlanReady));
        assert!(Phase::PlanReady.can_transition_to(Phase::TasksReady));
        assert!(Phase::TasksReady.can_transition_to(Phase::AwaitingApproval));
        assert!(Phase::AwaitingApproval.can_transition_to(Phase::Approved));
        assert!(Phase::AwaitingApproval.can_transition_to(Phase::Rejected));
        assert!(Phase::Approved.can_transition_to(Phase::Implemented));
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!Phase::Init.can_transition_to(Phase::PlanReady));
        assert!(!Phase::TasksReady.can_transition_to(Phase::Approved));
        assert!(!Phase::PlanReady.can_transition_to(Phase::ContextLoaded));
        assert!(!Phase::Approved.can_transition_to(Phase::Rejected));
        assert!(!Phase::TasksReady.can_transition_to(Phase::Rejected));
    }

    #[test]
    fn test_terminal_phases_are_absorbing() {
        for terminal in [Phase::Implemented, Phase::Rejected, Phase::Failed] {
            assert!(terminal.is_terminal());
            for next in Phase::ALL {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal() {
        for phase in Phase::ALL.into_iter().filter(|p| !p.is_terminal()) {
            assert!(phase.can_transition_to(Phase::Failed), "{} -> FAILED", phase);
        }
    }

    #[test]
    fn test_has_passed() {
        assert!(Phase::TasksReady.has_passed(Phase::PlanReady));
        assert!(!Phase::ContextLoaded.has_passed(Phase::PlanReady));
        assert!(Phase::Rejected.has_passed(Phase::TasksReady));
        assert!(!Phase::Rejected.has_passed(Phase::Implemented));
        assert!(!Phase::Failed.has_passed(Phase::Init));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Phase::AwaitingApproval).unwrap();
        assert_eq!(json, "\"AWAITING_APPROVAL\"");
        let back: Phase = serde_json::from_str("\"PLAN_READY\"").unwrap();
        assert_eq!(back, Phase::PlanReady);
        assert_eq!(Phase::PlanReady.to_string(), "PLAN_READY");
    }

    fn any_phase() -> impl Strategy<Value = Phase> {
        (0..Phase::ALL.len()).prop_map(|i| Phase::ALL[i])
    }

    proptest! {
        #[test]
        fn prop_edges_never_move_backwards(from in any_phase(), to in any_phase()) {
            if from.can_transition_to(to) && to != Phase::Failed {
                prop_assert!(to.rank() > from.rank());
            }
        }

        #[test]
        fn prop_walks_stay_on_graph(choices in proptest::collection::vec(0usize..4, 0..12)) {
            let mut phase = Phase::Init;
            for choice in choices {
                let next = phase.successors();
                if next.is_empty() {
                    prop_assert!(phase.is_terminal());
                    break;
                }
                let to = next[choice % next.len()];
                prop_assert!(phase.can_transition_to(to));
                phase = to;
            }
        }
    }
}
