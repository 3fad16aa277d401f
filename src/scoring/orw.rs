//! Objective right/wrong scoring.
//!
//! Scorers report how many answers of each outcome a contestant produced;
//! each outcome is worth a fixed (possibly negative) number of points.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fixed::Fixed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrwOutcome {
    Correct,
    Wrong,
    Bonus,
    Skip,
    Violation,
}

impl OrwOutcome {
    pub const ALL: [OrwOutcome; 5] = [
        OrwOutcome::Correct,
        OrwOutcome::Wrong,
        OrwOutcome::Bonus,
        OrwOutcome::Skip,
        OrwOutcome::Violation,
    ];

    pub fn key(self) -> &'static str {
        match self {
            OrwOutcome::Correct => "correct",
            OrwOutcome::Wrong => "wrong",
            OrwOutcome::Bonus => "bonus",
            OrwOutcome::Skip => "skip",
            OrwOutcome::Violation => "violation",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.key() == key)
    }
}

/// Points per outcome.
///
/// Example YAML:
/// ```yaml
/// kind:
///   orw:
///     correct: 2
///     wrong: -1
///     violation: -5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrwWeights {
    #[serde(default = "default_correct")]
    pub correct: Fixed,
    #[serde(default)]
    pub wrong: Fixed,
    #[serde(default)]
    pub bonus: Fixed,
    #[serde(default)]
    pub skip: Fixed,
    #[serde(default)]
    pub violation: Fixed,
}

fn default_correct() -> Fixed {
    Fixed::from_int(1)
}

impl Default for OrwWeights {
    fn default() -> Self {
        Self {
            correct: default_correct(),
            wrong: Fixed::ZERO,
            bonus: Fixed::ZERO,
            skip: Fixed::ZERO,
            violation: Fixed::ZERO,
        }
    }
}

impl OrwWeights {
    pub fn weight(&self, outcome: OrwOutcome) -> Fixed {
        match outcome {
            OrwOutcome::Correct => self.correct,
            OrwOutcome::Wrong => self.wrong,
            OrwOutcome::Bonus => self.bonus,
            OrwOutcome::Skip => self.skip,
            OrwOutcome::Violation => self.violation,
        }
    }

    /// Points for one scorer's counts. Unknown keys are ignored (rejected at submission).
    /// `None` when the points do not fit in a `Fixed`.
    pub fn points(&self, counts: &BTreeMap<String, Fixed>) -> Option<Fixed> {
        counts.iter().try_fold(Fixed::ZERO, |acc, (key, count)| {
            match OrwOutcome::from_key(key) {
                Some(outcome) => acc.checked_add(self.weight(outcome).checked_times(count.whole())?),
                None => Some(acc),
            }
        })
    }
}
