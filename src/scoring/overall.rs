//! Overall aggregation of finished rounds into event-level results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::error::TallyError;
use super::graph::rounds_in_order;
use super::rank::fractional_ranks;
use super::results::TallyStore;
use crate::event::{ContestantId, Event, EventId, RoundId, RoundStatus};
use crate::fixed::Fixed;

/// How round totals are combined into the overall score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    #[default]
    Sum,
    Mean,
}

/// What a finished round without an entry for a contestant means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentPolicy {
    /// The round contributes nothing and does not count toward a mean
    #[default]
    Exclude,
    /// The round counts as a zero score
    Zero,
    /// The contestant is removed from the overall ranking
    Disqualify,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverallPolicy {
    #[serde(default)]
    pub combine: Combine,
    #[serde(default)]
    pub absent: AbsentPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallEntry {
    pub contestant: ContestantId,
    pub score: Fixed,
    pub rank: Fixed,
    /// Finished rounds in which the contestant had a total
    pub rounds_counted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallTally {
    pub event: EventId,
    /// Finished rounds that were combined, in order
    pub rounds: Vec<RoundId>,
    /// Sorted by rank
    pub entries: Vec<OverallEntry>,
    #[serde(default)]
    pub disqualified: Vec<ContestantId>,
    pub computed_at: DateTime<Utc>,
}

/// Combine the totals of every finished round into one ranked list.
///
/// Finished rounds must have current results. Pending and ongoing rounds are
/// ignored, so an event with no finished round yields no entries.
pub fn combine_rounds(event: &Event, results: &TallyStore) -> Result<OverallTally, TallyError> {
    let policy = event.overall;
    let mut finished: Vec<(RoundId, BTreeMap<ContestantId, Fixed>)> = Vec::new();
    for round in rounds_in_order(event)? {
        if round.status != RoundStatus::Finished {
            continue;
        }
        let tally = results
            .get(&round.id)
            .ok_or_else(|| TallyError::MissingResults(round.id.clone()))?;
        if tally.stale {
            return Err(TallyError::StaleResults(round.id.clone()));
        }
        finished.push((round.id.clone(), tally.total_map()));
    }

    let mut scores: Vec<(ContestantId, Fixed)> = Vec::new();
    let mut counted: BTreeMap<ContestantId, usize> = BTreeMap::new();
    let mut disqualified = Vec::new();

    if !finished.is_empty() {
        for contestant in &event.contestants {
            let present: Vec<Fixed> = finished
                .iter()
                .filter_map(|(_, totals)| totals.get(&contestant.id).copied())
                .collect();
            let absent = finished.len() - present.len();

            let divisor = match policy.absent {
                AbsentPolicy::Exclude if present.is_empty() => continue,
                AbsentPolicy::Disqualify if absent > 0 => {
                    disqualified.push(contestant.id.clone());
                    continue;
                }
                AbsentPolicy::Zero => finished.len(),
                _ => present.len(),
            };

            let sum = Fixed::checked_sum(present.iter().copied()).ok_or_else(|| {
                TallyError::Overflow {
                    scope: format!("overall for event '{}'", event.id),
                    contestant: contestant.id.clone(),
                }
            })?;
            let score = match policy.combine {
                Combine::Sum => sum,
                Combine::Mean => Fixed::mean(sum, divisor),
            };
            counted.insert(contestant.id.clone(), present.len());
            scores.push((contestant.id.clone(), score));
        }
    }

    let entries: Vec<OverallEntry> = fractional_ranks(&scores)
        .into_iter()
        .map(|ranked| OverallEntry {
            rounds_counted: counted.get(&ranked.key).copied().unwrap_or(0),
            contestant: ranked.key,
            score: ranked.score,
            rank: ranked.rank,
        })
        .collect();

    debug!(
        event = %event.id,
        rounds = finished.len(),
        entries = entries.len(),
        disqualified = disqualified.len(),
        "overall combined"
    );

    Ok(OverallTally {
        event: event.id.clone(),
        rounds: finished.into_iter().map(|(id, _)| id).collect(),
        entries,
        disqualified,
        computed_at: Utc::now(),
    })
}

/// Secondary ordering among entries sharing a rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Contestant registration order in the event definition
    #[default]
    Roster,
    /// Contestant id, lexicographically
    ContestantId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Winners {
    pub entries: Vec<OverallEntry>,
    /// The last included entry shares its rank with the first excluded one
    pub tied_at_cutoff: bool,
}

/// Top `n` entries by rank, ties broken deterministically by `tie_break`.
pub fn winners(event: &Event, overall: &OverallTally, n: usize, tie_break: TieBreak) -> Winners {
    let mut sorted: Vec<&OverallEntry> = overall.entries.iter().collect();
    sorted.sort_by(|a, b| {
        a.rank.cmp(&b.rank).then_with(|| match tie_break {
            TieBreak::Roster => {
                let position = |id: &str| event.contestant_position(id).unwrap_or(usize::MAX);
                position(&a.contestant).cmp(&position(&b.contestant))
            }
            TieBreak::ContestantId => a.contestant.cmp(&b.contestant),
        })
    });

    let take = n.min(sorted.len());
    let tied_at_cutoff = take > 0 && take < sorted.len() && sorted[take - 1].rank == sorted[take].rank;

    Winners {
        entries: sorted.into_iter().take(take).cloned().collect(),
        tied_at_cutoff,
    }
}
