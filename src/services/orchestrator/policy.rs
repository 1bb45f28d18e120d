//! Convergence Policy
//!
//! Decides, after each attempt, whether to accept the candidate, retry, or
//! stop. Rules are evaluated in order and the first match wins:
//!
//! 1. timeout
//! 2. attempt ceiling (a valid final candidate is still accepted)
//! 3. duplicate candidate
//! 4. validity, then cardinality
//!
//! Semantic critic warnings never influence the decision.

use query_cascade_core::TerminationReason;
use query_cascade_validation::{Cardinality, CardinalityPolicy};

use super::state::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Retry,
    Stop(TerminationReason),
}

pub fn decide(state: &WorkflowState, duplicate: bool, cardinality: &CardinalityPolicy) -> Decision {
    if state.timed_out() {
        return Decision::Stop(TerminationReason::Timeout);
    }

    let valid = state.validation.as_ref().is_some_and(|v| v.valid);

    if state.attempts >= state.max_attempts {
        return if valid {
            Decision::Accept
        } else {
            Decision::Stop(TerminationReason::MaxAttempts)
        };
    }

    if duplicate {
        return Decision::Stop(TerminationReason::MaxAttempts);
    }

    let Some(validation) = state.validation.as_ref().filter(|v| v.valid) else {
        return Decision::Retry;
    };

    match cardinality.assess(&state.request, validation) {
        Some(Cardinality::EmptyAggregate) => Decision::Accept,
        Some(c) if c.warrants_retry() => Decision::Retry,
        _ => Decision::Accept,
    }
}
