use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::event::{ContestantId, JudgeId, RoundId};
use crate::fixed::Fixed;

/// One judge's values for one contestant, keyed by criterion id
/// (or by outcome key in ORW events).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreRow {
    pub contestant: ContestantId,
    #[serde(default)]
    pub values: BTreeMap<String, Fixed>,
}

/// A judge's batch for a round, one row per contestant.
///
/// Example YAML:
/// ```yaml
/// round: prelim
/// judge: j1
/// rows:
///   - contestant: c1
///     values: { poise: 88, wit: 72.5 }
///   - contestant: c2
///     values: { poise: 91, wit: 80 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreCard {
    pub round: RoundId,
    pub judge: JudgeId,
    pub rows: Vec<ScoreRow>,
}

/// A single (round, judge, contestant) submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub round: RoundId,
    pub judge: JudgeId,
    pub contestant: ContestantId,
    pub values: BTreeMap<String, Fixed>,
}

impl From<Submission> for ScoreCard {
    fn from(submission: Submission) -> Self {
        ScoreCard {
            round: submission.round,
            judge: submission.judge,
            rows: vec![ScoreRow {
                contestant: submission.contestant,
                values: submission.values,
            }],
        }
    }
}

/// Stored values for one (round, judge, contestant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScores {
    pub values: BTreeMap<String, Fixed>,
    pub submitted_at: DateTime<Utc>,
}

/// Owned snapshot of a round's raw scores: judge -> contestant -> values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundSheet {
    #[serde(default)]
    pub cards: BTreeMap<JudgeId, BTreeMap<ContestantId, RawScores>>,
}

impl RoundSheet {
    pub fn row(&self, judge: &str, contestant: &str) -> Option<&RawScores> {
        self.cards.get(judge).and_then(|card| card.get(contestant))
    }

    /// Values submitted for `key` for `contestant`, in judge-id order.
    pub fn values_for(&self, key: &str, contestant: &str) -> Vec<Fixed> {
        self.cards
            .values()
            .filter_map(|card| card.get(contestant))
            .filter_map(|row| row.values.get(key).copied())
            .collect()
    }

    /// Whether any judge has submitted anything for `contestant`.
    pub fn has_any(&self, contestant: &str) -> bool {
        self.cards.values().any(|card| card.contains_key(contestant))
    }

    pub fn rows_for<'a>(&'a self, contestant: &'a str) -> impl Iterator<Item = &'a RawScores> + 'a {
        self.cards.values().filter_map(move |card| card.get(contestant))
    }
}

/// Persisted form of the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub rounds: BTreeMap<RoundId, RoundSheet>,
    /// Rounds with submissions newer than their last recompute
    #[serde(default)]
    pub touched: BTreeSet<RoundId>,
}
