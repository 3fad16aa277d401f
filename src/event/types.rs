use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fixed::Fixed;
use crate::scoring::orw::OrwWeights;
use crate::scoring::overall::OverallPolicy;

pub type EventId = String;
pub type RoundId = String;
pub type CriterionId = String;
pub type ContestantId = String;
pub type JudgeId = String;

/// How judge values for a criterion are turned into the criterion score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// Mean of the submitting judges, then scaled by the criterion weight.
    #[default]
    Averaging,
    /// Judges' points accumulate unweighted.
    Pointing,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Averaging => write!(f, "averaging"),
            Regime::Pointing => write!(f, "pointing"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    #[default]
    Pending,
    Ongoing,
    Finished,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Pending => write!(f, "pending"),
            RoundStatus::Ongoing => write!(f, "ongoing"),
            RoundStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Event-wide scoring style.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Rounds are scored per criterion by judges.
    #[default]
    Criteria,
    /// Objective right/wrong: scorers tally outcome counts worth fixed points.
    Orw(OrwWeights),
}

/// A scorable dimension of a round.
///
/// Scored criteria carry `min`/`max` bounds for judge input. Derived criteria
/// carry `derived_from` instead and copy that round's total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Criterion {
    pub id: CriterionId,

    #[serde(default)]
    pub label: Option<String>,

    /// Percentage weight, only meaningful in the averaging regime
    #[serde(default)]
    pub weight: Option<Fixed>,

    #[serde(default)]
    pub min: Option<Fixed>,

    #[serde(default)]
    pub max: Option<Fixed>,

    /// Source round whose total becomes this criterion's score
    #[serde(default)]
    pub derived_from: Option<RoundId>,
}

impl Criterion {
    pub fn is_derived(&self) -> bool {
        self.derived_from.is_some()
    }

    /// Inclusive input bounds, `None` for derived criteria.
    pub fn bounds(&self) -> Option<(Fixed, Fixed)> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if !self.is_derived() => Some((min, max)),
            _ => None,
        }
    }

    pub fn weight_percent(&self) -> Fixed {
        self.weight.unwrap_or(Fixed::ZERO)
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Round {
    pub id: RoundId,

    #[serde(default)]
    pub title: Option<String>,

    /// Position within the event, starting at 1
    pub order: u32,

    #[serde(default)]
    pub regime: Regime,

    #[serde(default)]
    pub status: RoundStatus,

    /// Contestants taking part in this round
    #[serde(default)]
    pub active: Vec<ContestantId>,

    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl Round {
    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    pub fn scored_criteria(&self) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter().filter(|c| !c.is_derived())
    }

    pub fn is_active(&self, contestant: &str) -> bool {
        self.active.iter().any(|c| c == contestant)
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contestant {
    pub id: ContestantId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Judge {
    pub id: JudgeId,
    #[serde(default)]
    pub name: Option<String>,
}

/// Full definition of a judged event.
///
/// Example YAML:
/// ```yaml
/// id: campus-2026
/// title: Campus Pageant 2026
/// contestants:
///   - { id: c1, name: Alice }
///   - { id: c2, name: Bea }
/// judges:
///   - { id: j1 }
///   - { id: j2 }
/// rounds:
///   - id: prelim
///     order: 1
///     criteria:
///       - { id: poise, weight: 60, min: 0, max: 100 }
///       - { id: wit, weight: 40, min: 0, max: 100 }
///   - id: final
///     order: 2
///     regime: pointing
///     criteria:
///       - { id: carry, derived_from: prelim }
///       - { id: qa, min: 0, max: 10 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Event {
    pub id: EventId,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub kind: EventKind,

    pub contestants: Vec<Contestant>,

    pub judges: Vec<Judge>,

    #[serde(default)]
    pub overall: OverallPolicy,

    pub rounds: Vec<Round>,
}

impl Event {
    pub fn round(&self, id: &str) -> Option<&Round> {
        self.rounds.iter().find(|r| r.id == id)
    }

    pub fn round_mut(&mut self, id: &str) -> Option<&mut Round> {
        self.rounds.iter_mut().find(|r| r.id == id)
    }

    pub fn contestant(&self, id: &str) -> Option<&Contestant> {
        self.contestants.iter().find(|c| c.id == id)
    }

    /// Registration order of a contestant, used for stable tie-breaks.
    pub fn contestant_position(&self, id: &str) -> Option<usize> {
        self.contestants.iter().position(|c| c.id == id)
    }

    pub fn contestant_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.contestant(id)
            .and_then(|c| c.name.as_deref())
            .unwrap_or(id)
    }

    pub fn judge(&self, id: &str) -> Option<&Judge> {
        self.judges.iter().find(|j| j.id == id)
    }

    pub fn judge_ids(&self) -> Vec<JudgeId> {
        self.judges.iter().map(|j| j.id.clone()).collect()
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}
