use thiserror::Error;

use crate::event::{ContestantId, CriterionId, JudgeId, RoundId, RoundStatus};
use crate::fixed::Fixed;

/// A single reason a score card was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown judge '{judge}'")]
    UnknownJudge { judge: JudgeId },

    #[error("round '{round}' is {status}; scores are accepted only while it is ongoing")]
    RoundNotOpen { round: RoundId, status: RoundStatus },

    #[error("contestant '{contestant}' is not active in round '{round}'")]
    ContestantNotActive { round: RoundId, contestant: ContestantId },

    #[error("contestant '{contestant}' appears more than once in the card")]
    DuplicateContestant { contestant: ContestantId },

    #[error("{contestant}: missing value for criterion '{criterion}'")]
    MissingValue {
        contestant: ContestantId,
        criterion: CriterionId,
    },

    #[error("{contestant}: value {value} for criterion '{criterion}' is outside [{min}, {max}]")]
    OutOfRange {
        contestant: ContestantId,
        criterion: CriterionId,
        value: Fixed,
        min: Fixed,
        max: Fixed,
    },

    #[error("{contestant}: criterion '{criterion}' is derived from round '{source_round}' and takes no direct input")]
    DerivedInput {
        contestant: ContestantId,
        criterion: CriterionId,
        source_round: RoundId,
    },

    #[error("{contestant}: unknown criterion '{criterion}'")]
    UnknownCriterion {
        contestant: ContestantId,
        criterion: CriterionId,
    },

    #[error("{contestant}: unknown outcome '{key}', expected one of correct, wrong, bonus, skip, violation")]
    UnknownOutcome { contestant: ContestantId, key: String },

    #[error("{contestant}: count {value} for outcome '{key}' must be a non-negative whole number")]
    InvalidCount {
        contestant: ContestantId,
        key: String,
        value: Fixed,
    },
}

#[derive(Debug, Error)]
pub enum TallyError {
    /// Score card failed validation; nothing was written.
    #[error("submission rejected for judge '{judge}' in round '{round}': {}", join_reasons(.reasons))]
    Rejected {
        round: RoundId,
        judge: JudgeId,
        reasons: Vec<ValidationError>,
    },

    /// A derived criterion's source round has no usable total yet.
    #[error("round '{round}' is not ready to tally: criterion '{criterion}' derives from round '{source_round}', which {reason}")]
    UnresolvedDependency {
        round: RoundId,
        criterion: CriterionId,
        source_round: RoundId,
        reason: String,
    },

    #[error("unknown round '{0}'")]
    UnknownRound(RoundId),

    #[error("unknown contestant '{0}'")]
    UnknownContestant(ContestantId),

    #[error("round '{round}' is {status}, expected {expected}")]
    InvalidTransition {
        round: RoundId,
        status: RoundStatus,
        expected: RoundStatus,
    },

    #[error("results for finished round '{0}' are stale; recompute it first")]
    StaleResults(RoundId),

    #[error("finished round '{0}' has no computed results")]
    MissingResults(RoundId),

    /// A sum of scores left the representable range.
    #[error("{scope}: score for contestant '{contestant}' is too large to represent")]
    Overflow { scope: String, contestant: ContestantId },

    #[error("invalid event definition:\n  - {}", .0.join("\n  - "))]
    InvalidEvent(Vec<String>),
}

impl TallyError {
    /// Whether the round can become tally-able later without any input change.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            TallyError::UnresolvedDependency { .. }
                | TallyError::StaleResults(_)
                | TallyError::MissingResults(_)
        )
    }
}

fn join_reasons(reasons: &[ValidationError]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
