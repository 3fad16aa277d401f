//! Aggregation primitives shared by the tally computer and the presenter.
//! Both paths call these so displayed numbers never diverge from tallies.

use crate::event::{Criterion, Regime};
use crate::fixed::Fixed;
use crate::ledger::RawScores;

/// Score of one scored criterion for one contestant.
///
/// Only judges who submitted a value are passed in, so the averaging divisor
/// is the number of submitters rather than the judge roster. `None` when the
/// judges' values do not sum within range.
pub fn criterion_score(regime: Regime, values: &[Fixed], weight_percent: Fixed) -> Option<Fixed> {
    let sum = Fixed::checked_sum(values.iter().copied())?;
    Some(match regime {
        Regime::Averaging => Fixed::weighted_mean(sum, values.len(), weight_percent),
        Regime::Pointing => sum,
    })
}

/// Unweighted mean of the submitted values, `None` when nobody submitted.
pub fn raw_average(values: &[Fixed]) -> Option<Fixed> {
    if values.is_empty() {
        return None;
    }
    Fixed::checked_sum(values.iter().copied()).map(|sum| Fixed::mean(sum, values.len()))
}

/// One judge's own contribution to a contestant's round score.
pub fn judge_contribution(regime: Regime, criteria: &[&Criterion], row: &RawScores) -> Option<Fixed> {
    Fixed::checked_sum(criteria.iter().filter_map(|criterion| {
        let value = row.values.get(&criterion.id)?;
        Some(match regime {
            Regime::Averaging => value.percent(criterion.weight_percent()),
            Regime::Pointing => *value,
        })
    }))
}
