//! Criterion graph: event validation, round ordering and derivation links.

use std::collections::{BTreeMap, HashSet};

use super::error::TallyError;
use super::results::TallyStore;
use crate::event::{ContestantId, Criterion, CriterionId, Event, EventKind, Regime, Round, RoundId, RoundStatus};
use crate::fixed::Fixed;

/// Allowed deviation of averaging-regime weights from 100.
const WEIGHT_TOLERANCE: Fixed = Fixed::from_millionths(100_000);

/// Validate an event definition.
/// Returns all validation errors at once (not just the first).
pub fn validate_event(event: &Event) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    check_unique("contestants", event.contestants.iter().map(|c| c.id.as_str()), &mut errors);
    check_unique("judges", event.judges.iter().map(|j| j.id.as_str()), &mut errors);
    check_unique("rounds", event.rounds.iter().map(|r| r.id.as_str()), &mut errors);

    let mut orders = HashSet::new();
    for (i, round) in event.rounds.iter().enumerate() {
        let path = format!("rounds[{}]", i);

        if round.order == 0 {
            errors.push(format!("{}.order: must be 1 or greater", path));
        } else if !orders.insert(round.order) {
            errors.push(format!("{}.order: duplicate order {}", path, round.order));
        }

        for contestant in &round.active {
            if event.contestant(contestant).is_none() {
                errors.push(format!("{}.active: unknown contestant '{}'", path, contestant));
            }
        }

        if let EventKind::Orw(_) = event.kind {
            if !round.criteria.is_empty() {
                errors.push(format!(
                    "{}.criteria: ORW rounds are scored by outcome counts and take no criteria",
                    path
                ));
            }
            continue;
        }

        if round.criteria.is_empty() {
            errors.push(format!("{}.criteria: at least one criterion is required", path));
        }
        check_unique(
            &format!("{}.criteria", path),
            round.criteria.iter().map(|c| c.id.as_str()),
            &mut errors,
        );

        for (j, criterion) in round.criteria.iter().enumerate() {
            validate_criterion(event, round, criterion, &format!("{}.criteria[{}]", path, j), &mut errors);
        }

        if round.regime == Regime::Averaging && round.scored_criteria().next().is_some() {
            let total: Fixed = round.scored_criteria().map(|c| c.weight_percent()).sum();
            if total.abs_diff(Fixed::HUNDRED) > WEIGHT_TOLERANCE {
                errors.push(format!(
                    "{}: weights of scored criteria sum to {}, expected 100",
                    path, total
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_criterion(
    event: &Event,
    round: &Round,
    criterion: &Criterion,
    path: &str,
    errors: &mut Vec<String>,
) {
    match &criterion.derived_from {
        Some(source) => {
            if criterion.min.is_some() || criterion.max.is_some() {
                errors.push(format!("{}: derived criteria take no min/max bounds", path));
            }
            match event.round(source) {
                None => errors.push(format!("{}.derived_from: unknown round '{}'", path, source)),
                Some(src) if src.order >= round.order => errors.push(format!(
                    "{}.derived_from: round '{}' (order {}) does not come before this round (order {})",
                    path, source, src.order, round.order
                )),
                Some(_) => {}
            }
        }
        None => match (criterion.min, criterion.max) {
            (Some(min), Some(max)) if min > max => {
                errors.push(format!("{}: min {} exceeds max {}", path, min, max))
            }
            (Some(_), Some(_)) => {}
            _ => errors.push(format!("{}: scored criteria need both min and max", path)),
        },
    }

    if let Some(weight) = criterion.weight {
        if weight < Fixed::ZERO || weight > Fixed::HUNDRED {
            errors.push(format!("{}.weight: must be between 0 and 100", path));
        }
    }
}

fn check_unique<'a>(path: &str, ids: impl Iterator<Item = &'a str>, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(format!("{}: duplicate id '{}'", path, id));
        }
    }
}

/// Rounds sorted by `order`. Duplicate orders are an error, never resolved by storage order.
pub fn rounds_in_order(event: &Event) -> Result<Vec<&Round>, TallyError> {
    let mut rounds: Vec<&Round> = event.rounds.iter().collect();
    rounds.sort_by_key(|r| r.order);
    if let Some(pair) = rounds.windows(2).find(|w| w[0].order == w[1].order) {
        return Err(TallyError::InvalidEvent(vec![format!(
            "rounds '{}' and '{}' share order {}",
            pair[0].id, pair[1].id, pair[0].order
        )]));
    }
    Ok(rounds)
}

#[derive(Debug)]
pub struct DerivedLink<'a> {
    pub criterion: &'a Criterion,
    pub source: &'a RoundId,
}

/// Evaluation order within a round: scored criteria first, derived criteria last.
#[derive(Debug)]
pub struct EvaluationPlan<'a> {
    pub scored: Vec<&'a Criterion>,
    pub derived: Vec<DerivedLink<'a>>,
}

pub fn evaluation_plan(round: &Round) -> EvaluationPlan<'_> {
    let mut plan = EvaluationPlan {
        scored: Vec::new(),
        derived: Vec::new(),
    };
    for criterion in &round.criteria {
        match &criterion.derived_from {
            Some(source) => plan.derived.push(DerivedLink { criterion, source }),
            None => plan.scored.push(criterion),
        }
    }
    plan
}

/// Source-round totals for each derived criterion of a round.
pub type DerivedSources = BTreeMap<CriterionId, BTreeMap<ContestantId, Fixed>>;

/// Look up the persisted totals every derived criterion of `round` reads.
///
/// The source must come earlier in the event, be finished, and have a current
/// (non-stale) tally. Anything else means the round is not ready to tally.
pub fn resolve_derived(
    event: &Event,
    round: &Round,
    results: &TallyStore,
) -> Result<DerivedSources, TallyError> {
    let mut sources = DerivedSources::new();
    for link in evaluation_plan(round).derived {
        let unresolved = |reason: String| TallyError::UnresolvedDependency {
            round: round.id.clone(),
            criterion: link.criterion.id.clone(),
            source_round: link.source.clone(),
            reason,
        };

        let source = event
            .round(link.source)
            .ok_or_else(|| unresolved("does not exist".to_string()))?;
        if source.order >= round.order {
            return Err(unresolved(format!(
                "does not come before it (order {} vs {})",
                source.order, round.order
            )));
        }
        if source.status != RoundStatus::Finished {
            return Err(unresolved(format!("is {}, not finished", source.status)));
        }
        let tally = results
            .get(link.source)
            .ok_or_else(|| unresolved("has no computed totals".to_string()))?;
        if tally.stale {
            return Err(unresolved("has stale totals".to_string()));
        }

        sources.insert(link.criterion.id.clone(), tally.total_map());
    }
    Ok(sources)
}

/// Every round that derives from `round`, directly or transitively, in order.
pub fn dependents_of(event: &Event, round: &str) -> Vec<RoundId> {
    let mut found: HashSet<&str> = HashSet::new();
    let mut frontier = vec![round];
    while let Some(current) = frontier.pop() {
        for candidate in &event.rounds {
            let derives = candidate
                .criteria
                .iter()
                .any(|c| c.derived_from.as_deref() == Some(current));
            if derives && candidate.id != round && found.insert(candidate.id.as_str()) {
                frontier.push(candidate.id.as_str());
            }
        }
    }

    let mut dependents: Vec<&Round> = event
        .rounds
        .iter()
        .filter(|r| found.contains(r.id.as_str()))
        .collect();
    dependents.sort_by_key(|r| r.order);
    dependents.into_iter().map(|r| r.id.clone()).collect()
}
