//! Read-side projection of a round for display.
//!
//! Every number here comes from the aggregation primitives in
//! `scoring::aggregate` or from the computed tally, never from a separate
//! calculation.

use crate::event::{ContestantId, CriterionId, Event, EventKind, JudgeId, Regime, Round, RoundId, RoundStatus};
use crate::fixed::Fixed;
use crate::ledger::RoundSheet;
use crate::scoring::aggregate::{criterion_score, judge_contribution, raw_average};
use crate::scoring::tally::is_fully_scored;
use crate::scoring::RoundTally;

/// One contestant's line of the judge × contestant matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    pub contestant: ContestantId,
    pub name: String,
    /// Each judge's own contribution, in judge roster order
    pub cells: Vec<Option<Fixed>>,
    pub total: Option<Fixed>,
    pub rank: Option<Fixed>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriterionRow {
    pub contestant: ContestantId,
    pub name: String,
    /// Raw judge values, empty for derived criteria
    pub values: Vec<Option<Fixed>>,
    pub average: Option<Fixed>,
    pub score: Option<Fixed>,
    pub rank: Option<Fixed>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriterionTable {
    pub criterion: CriterionId,
    pub label: String,
    /// Only shown in the averaging regime
    pub weight: Option<Fixed>,
    pub derived_from: Option<RoundId>,
    pub rows: Vec<CriterionRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundView {
    pub round: RoundId,
    pub title: String,
    pub regime: Regime,
    pub status: RoundStatus,
    pub judges: Vec<JudgeId>,
    pub rows: Vec<MatrixRow>,
    /// Judge × contestant cells holding every scored criterion. A round with
    /// only derived criteria needs no input, so all of its cells count.
    pub filled_cells: usize,
    pub total_cells: usize,
    pub complete: bool,
    /// Present once every cell is filled
    pub criteria: Vec<CriterionTable>,
    pub generation: Option<u64>,
    pub stale: bool,
}

pub fn build_round_view(
    event: &Event,
    round: &Round,
    sheet: &RoundSheet,
    tally: Option<&RoundTally>,
) -> RoundView {
    let judges = event.judge_ids();
    let scored: Vec<_> = round.scored_criteria().collect();
    let needs_input = !matches!(event.kind, EventKind::Criteria) || !scored.is_empty();

    let mut filled_cells = 0;
    let rows: Vec<MatrixRow> = round
        .active
        .iter()
        .map(|contestant| {
            let cells: Vec<Option<Fixed>> = judges
                .iter()
                .map(|judge| {
                    let row = sheet.row(judge, contestant);
                    let filled = match row {
                        Some(row) => scored.iter().all(|c| row.values.contains_key(&c.id)),
                        None => !needs_input,
                    };
                    if filled {
                        filled_cells += 1;
                    }
                    let row = row?;
                    match &event.kind {
                        EventKind::Criteria => judge_contribution(round.regime, &scored, row),
                        EventKind::Orw(weights) => weights.points(&row.values),
                    }
                })
                .collect();
            let total = tally.and_then(|t| t.total_for(contestant));
            MatrixRow {
                contestant: contestant.clone(),
                name: event.contestant_name(contestant).to_string(),
                cells,
                total: total.map(|e| e.score),
                rank: total.map(|e| e.rank),
            }
        })
        .collect();

    let complete = is_fully_scored(event, round, sheet);
    let criteria = match event.kind {
        EventKind::Criteria if complete => criterion_tables(event, round, sheet, tally, &judges),
        _ => Vec::new(),
    };

    RoundView {
        round: round.id.clone(),
        title: round.display_title().to_string(),
        regime: round.regime,
        status: round.status,
        total_cells: judges.len() * round.active.len(),
        filled_cells,
        complete,
        judges,
        rows,
        criteria,
        generation: tally.map(|t| t.generation),
        stale: tally.is_some_and(|t| t.stale),
    }
}

fn criterion_tables(
    event: &Event,
    round: &Round,
    sheet: &RoundSheet,
    tally: Option<&RoundTally>,
    judges: &[JudgeId],
) -> Vec<CriterionTable> {
    round
        .criteria
        .iter()
        .map(|criterion| {
            let rows = round
                .active
                .iter()
                .map(|contestant| {
                    let entry = tally.and_then(|t| t.criterion_entry(&criterion.id, contestant));
                    let (values, average, score) = if criterion.is_derived() {
                        (Vec::new(), None, entry.map(|e| e.score))
                    } else {
                        let values: Vec<Option<Fixed>> = judges
                            .iter()
                            .map(|j| {
                                sheet
                                    .row(j, contestant)
                                    .and_then(|row| row.values.get(&criterion.id).copied())
                            })
                            .collect();
                        let submitted: Vec<Fixed> = values.iter().flatten().copied().collect();
                        let score = criterion_score(round.regime, &submitted, criterion.weight_percent());
                        (values, raw_average(&submitted), score)
                    };
                    CriterionRow {
                        contestant: contestant.clone(),
                        name: event.contestant_name(contestant).to_string(),
                        values,
                        average,
                        score,
                        rank: entry.map(|e| e.rank),
                    }
                })
                .collect();

            CriterionTable {
                criterion: criterion.id.clone(),
                label: criterion.display_label().to_string(),
                weight: match round.regime {
                    Regime::Averaging if !criterion.is_derived() => Some(criterion.weight_percent()),
                    _ => None,
                },
                derived_from: criterion.derived_from.clone(),
                rows,
            }
        })
        .collect()
}
