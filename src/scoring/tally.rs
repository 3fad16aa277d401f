use std::collections::BTreeMap;

use super::aggregate::criterion_score;
use super::error::TallyError;
use super::graph::{evaluation_plan, DerivedSources};
use super::orw::OrwWeights;
use super::rank::fractional_ranks;
use super::results::{ComputedEntry, ComputedRound};
use crate::event::{ContestantId, CriterionId, Event, EventKind, Round};
use crate::fixed::Fixed;
use crate::ledger::RoundSheet;

/// Compute every entry for one round from a ledger snapshot.
///
/// Pure: the same event, sheet and derived sources always give the same
/// entries in the same order. Contestants outside the round's active set
/// never appear, whatever the ledger still holds for them.
///
/// Fails with [`TallyError::Overflow`] when a sum leaves the `Fixed` range.
pub fn compute_round_entries(
    event: &Event,
    round: &Round,
    sheet: &RoundSheet,
    sources: &DerivedSources,
) -> Result<ComputedRound, TallyError> {
    let entries = match &event.kind {
        EventKind::Criteria => criteria_entries(round, sheet, sources)?,
        EventKind::Orw(weights) => orw_entries(round, sheet, weights)?,
    };
    Ok(ComputedRound {
        entries,
        complete: is_fully_scored(event, round, sheet),
    })
}

fn overflow(round: &Round, contestant: &str) -> TallyError {
    TallyError::Overflow {
        scope: format!("round '{}'", round.id),
        contestant: contestant.to_string(),
    }
}

/// Contestants that enter the computation.
///
/// Only active contestants with at least one stored row, so "not yet scored"
/// stays distinct from "scored zero". A round without scored criteria has no
/// input to wait for and includes the whole active set.
fn participants<'a>(round: &'a Round, sheet: &RoundSheet, needs_input: bool) -> Vec<&'a ContestantId> {
    round
        .active
        .iter()
        .filter(|c| !needs_input || sheet.has_any(c))
        .collect()
}

fn criteria_entries(
    round: &Round,
    sheet: &RoundSheet,
    sources: &DerivedSources,
) -> Result<Vec<ComputedEntry>, TallyError> {
    let plan = evaluation_plan(round);
    let contestants = participants(round, sheet, !plan.scored.is_empty());

    let mut per_criterion: BTreeMap<&CriterionId, Vec<(ContestantId, Fixed)>> = BTreeMap::new();
    for criterion in &plan.scored {
        let scores = contestants
            .iter()
            .map(|&c| {
                let values = sheet.values_for(&criterion.id, c);
                criterion_score(round.regime, &values, criterion.weight_percent())
                    .map(|score| (c.clone(), score))
                    .ok_or_else(|| overflow(round, c))
            })
            .collect::<Result<Vec<_>, _>>()?;
        per_criterion.insert(&criterion.id, scores);
    }
    for link in &plan.derived {
        let source_totals = sources.get(&link.criterion.id);
        let scores = contestants
            .iter()
            .map(|&c| {
                let score = source_totals
                    .and_then(|totals| totals.get(c))
                    .copied()
                    .unwrap_or(Fixed::ZERO);
                (c.clone(), score)
            })
            .collect();
        per_criterion.insert(&link.criterion.id, scores);
    }

    let mut entries = Vec::new();
    let mut totals: Vec<(ContestantId, Fixed)> = contestants
        .iter()
        .map(|&c| (c.clone(), Fixed::ZERO))
        .collect();

    // Definition order keeps breakdown tables in the order the event lists them
    for criterion in &round.criteria {
        let Some(scores) = per_criterion.get(&criterion.id) else {
            continue;
        };
        for (total, (contestant, score)) in totals.iter_mut().zip(scores) {
            total.1 = total.1
                .checked_add(*score)
                .ok_or_else(|| overflow(round, contestant))?;
        }
        entries.extend(ranked_entries(&round.id, Some(&criterion.id), scores));
    }
    entries.extend(ranked_entries(&round.id, None, &totals));
    Ok(entries)
}

fn orw_entries(
    round: &Round,
    sheet: &RoundSheet,
    weights: &OrwWeights,
) -> Result<Vec<ComputedEntry>, TallyError> {
    let totals = participants(round, sheet, true)
        .into_iter()
        .map(|c| {
            sheet
                .rows_for(c)
                .try_fold(Fixed::ZERO, |acc, row| acc.checked_add(weights.points(&row.values)?))
                .map(|points| (c.clone(), points))
                .ok_or_else(|| overflow(round, c))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ranked_entries(&round.id, None, &totals))
}

fn ranked_entries(
    round: &str,
    criterion: Option<&CriterionId>,
    scores: &[(ContestantId, Fixed)],
) -> Vec<ComputedEntry> {
    fractional_ranks(scores)
        .into_iter()
        .map(|ranked| ComputedEntry {
            round: round.to_string(),
            contestant: ranked.key,
            criterion: criterion.cloned(),
            score: ranked.score,
            rank: ranked.rank,
        })
        .collect()
}

/// Whether every active contestant has a value from every registered judge
/// for every scored criterion (every outcome row, for ORW rounds).
pub fn is_fully_scored(event: &Event, round: &Round, sheet: &RoundSheet) -> bool {
    if round.active.is_empty() {
        return false;
    }
    let scored: Vec<&CriterionId> = match event.kind {
        EventKind::Criteria => round.scored_criteria().map(|c| &c.id).collect(),
        EventKind::Orw(_) => Vec::new(),
    };
    if matches!(event.kind, EventKind::Criteria) && scored.is_empty() {
        return true;
    }

    event.judges.iter().all(|judge| {
        round.active.iter().all(|contestant| {
            sheet
                .row(&judge.id, contestant)
                .is_some_and(|row| scored.iter().all(|c| row.values.contains_key(*c)))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event;
    use crate::ledger::RawScores;
    use chrono::{TimeZone, Utc};

    fn fx(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    fn event() -> Event {
        parse_event(
            r#"
id: pageant
contestants: [{ id: c1 }, { id: c2 }, { id: c3 }, { id: c4 }]
judges: [{ id: j1 }, { id: j2 }, { id: j3 }]
rounds:
  - id: prelim
    order: 1
    status: ongoing
    active: [c1, c2, c3, c4]
    criteria:
      - { id: poise, weight: 40, min: 0, max: 100 }
      - { id: wit, weight: 35, min: 0, max: 100 }
      - { id: style, weight: 25, min: 0, max: 100 }
  - id: final
    order: 2
    status: ongoing
    regime: pointing
    active: [c1, c2]
    criteria:
      - { id: carry, derived_from: prelim }
      - { id: qa, weight: 60, min: 0, max: 10 }
      - { id: gown, weight: 40, min: 0, max: 10 }
"#,
        )
        .unwrap()
    }

    /// Rows as (judge, contestant, [(key, value)]).
    fn sheet(rows: Vec<(&str, &str, Vec<(&str, &str)>)>) -> RoundSheet {
        let submitted_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut sheet = RoundSheet::default();
        for (judge, contestant, values) in rows {
            sheet.cards.entry(judge.to_string()).or_default().insert(
                contestant.to_string(),
                RawScores {
                    values: values.into_iter().map(|(k, v)| (k.to_string(), fx(v))).collect(),
                    submitted_at,
                },
            );
        }
        sheet
    }

    fn total(computed: &ComputedRound, contestant: &str) -> Option<(Fixed, Fixed)> {
        computed
            .entries
            .iter()
            .find(|e| e.criterion.is_none() && e.contestant == contestant)
            .map(|e| (e.score, e.rank))
    }

    fn criterion(computed: &ComputedRound, criterion: &str, contestant: &str) -> Fixed {
        computed
            .entries
            .iter()
            .find(|e| e.criterion.as_deref() == Some(criterion) && e.contestant == contestant)
            .map(|e| e.score)
            .unwrap()
    }

    #[test]
    fn test_weighted_sum() {
        let event = event();
        let round = event.round("prelim").unwrap();
        let sheet = sheet(vec![(
            "j1",
            "c1",
            vec![("poise", "80"), ("wit", "90"), ("style", "70")],
        )]);

        let computed = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap();
        assert_eq!(criterion(&computed, "poise", "c1"), fx("32"));
        assert_eq!(criterion(&computed, "wit", "c1"), fx("31.5"));
        assert_eq!(criterion(&computed, "style", "c1"), fx("17.5"));
        assert_eq!(total(&computed, "c1"), Some((fx("81"), fx("1"))));
    }

    #[test]
    fn test_divisor_counts_submitters_only() {
        let event = event();
        let round = event.round("prelim").unwrap();
        let sheet = sheet(vec![
            ("j1", "c1", vec![("poise", "80"), ("wit", "90"), ("style", "70")]),
            ("j2", "c1", vec![("poise", "90"), ("wit", "90"), ("style", "70")]),
        ]);

        let computed = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap();
        // (80 + 90) / 2 × 40%
        assert_eq!(criterion(&computed, "poise", "c1"), fx("34"));
        assert!(!computed.complete);
    }

    #[test]
    fn test_unscored_contestants_are_excluded() {
        let event = event();
        let round = event.round("prelim").unwrap();
        let sheet = sheet(vec![
            ("j1", "c1", vec![("poise", "50"), ("wit", "50"), ("style", "50")]),
            ("j1", "c2", vec![("poise", "0"), ("wit", "0"), ("style", "0")]),
        ]);

        let computed = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap();
        assert_eq!(total(&computed, "c2"), Some((Fixed::ZERO, fx("2"))));
        assert!(total(&computed, "c3").is_none());
        // 3 criteria + 1 total, for 2 contestants
        assert_eq!(computed.entries.len(), 8);
    }

    #[test]
    fn test_ties_use_mid_rank() {
        let event = event();
        let round = event.round("prelim").unwrap();
        let all = |v: &'static str| vec![("poise", v), ("wit", v), ("style", v)];
        let sheet = sheet(vec![
            ("j1", "c1", all("90")),
            ("j1", "c2", all("85")),
            ("j1", "c3", all("85")),
            ("j1", "c4", all("70")),
        ]);

        let computed = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap();
        let ranks: Vec<Fixed> = ["c1", "c2", "c3", "c4"]
            .iter()
            .map(|c| total(&computed, c).unwrap().1)
            .collect();
        assert_eq!(ranks, vec![fx("1"), fx("2.5"), fx("2.5"), fx("4")]);

        let wit = computed
            .entries
            .iter()
            .find(|e| e.criterion.as_deref() == Some("wit") && e.contestant == "c3")
            .unwrap();
        assert_eq!(wit.rank, fx("2.5"));
    }

    #[test]
    fn test_derived_copies_source_total() {
        let event = event();
        let round = event.round("final").unwrap();
        let sources = DerivedSources::from([(
            "carry".to_string(),
            BTreeMap::from([("c1".to_string(), fx("81"))]),
        )]);
        let sheet = sheet(vec![
            ("j1", "c1", vec![("qa", "2"), ("gown", "3")]),
            ("j1", "c2", vec![("qa", "10"), ("gown", "10")]),
        ]);

        let computed = compute_round_entries(&event, round, &sheet, &sources).unwrap();
        assert_eq!(criterion(&computed, "carry", "c1"), fx("81"));
        // c2 has no source total: contributes zero but is still listed
        assert_eq!(criterion(&computed, "carry", "c2"), Fixed::ZERO);
        assert_eq!(total(&computed, "c1").unwrap().0, fx("86"));
    }

    #[test]
    fn test_pointing_ignores_weights_and_sums_judges() {
        let event = event();
        let round = event.round("final").unwrap();
        let sheet = sheet(vec![
            ("j1", "c1", vec![("qa", "7"), ("gown", "5")]),
            ("j2", "c1", vec![("qa", "6"), ("gown", "4")]),
        ]);

        let computed = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap();
        assert_eq!(criterion(&computed, "qa", "c1"), fx("13"));
        assert_eq!(total(&computed, "c1").unwrap().0, fx("22"));
    }

    #[test]
    fn test_idempotent() {
        let event = event();
        let round = event.round("prelim").unwrap();
        let sheet = sheet(vec![
            ("j1", "c1", vec![("poise", "81.3"), ("wit", "77"), ("style", "64.25")]),
            ("j2", "c1", vec![("poise", "79"), ("wit", "80"), ("style", "66")]),
            ("j3", "c2", vec![("poise", "81.3"), ("wit", "77"), ("style", "64.25")]),
        ]);

        let first = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap();
        let second = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ghost_removal() {
        let mut event = event();
        let sheet = sheet(vec![
            ("j1", "c1", vec![("poise", "50"), ("wit", "50"), ("style", "50")]),
            ("j1", "c2", vec![("poise", "60"), ("wit", "60"), ("style", "60")]),
        ]);
        let before = compute_round_entries(&event, &event.rounds[0], &sheet, &DerivedSources::new()).unwrap();
        assert!(total(&before, "c2").is_some());

        event.rounds[0].active.retain(|c| c != "c2");
        let after = compute_round_entries(&event, &event.rounds[0], &sheet, &DerivedSources::new()).unwrap();
        assert!(after.entries.iter().all(|e| e.contestant != "c2"));
        assert_eq!(total(&after, "c1").unwrap().1, fx("1"));
    }

    #[test]
    fn test_fully_scored() {
        let mut event = event();
        event.rounds[1].active = vec!["c1".to_string()];
        let round = event.round("final").unwrap().clone();

        let mut rows = Vec::new();
        for judge in ["j1", "j2"] {
            rows.push((judge, "c1", vec![("qa", "5"), ("gown", "5")]));
        }
        assert!(!is_fully_scored(&event, &round, &sheet(rows.clone())));

        rows.push(("j3", "c1", vec![("qa", "5"), ("gown", "5")]));
        assert!(is_fully_scored(&event, &round, &sheet(rows)));
    }

    #[test]
    fn test_all_derived_round_includes_active_set() {
        let mut event = event();
        event.rounds[1].criteria.retain(|c| c.is_derived());
        let round = event.round("final").unwrap();
        let sources = DerivedSources::from([(
            "carry".to_string(),
            BTreeMap::from([("c1".to_string(), fx("70")), ("c2".to_string(), fx("75"))]),
        )]);

        let computed = compute_round_entries(&event, round, &RoundSheet::default(), &sources).unwrap();
        assert!(computed.complete);
        assert_eq!(total(&computed, "c2"), Some((fx("75"), fx("1"))));
        assert_eq!(total(&computed, "c1"), Some((fx("70"), fx("2"))));
    }

    #[test]
    fn test_orw_totals() {
        let event = parse_event(
            r#"
id: quiz
kind: { orw: { correct: 2, wrong: -1, bonus: 3 } }
contestants: [{ id: t1 }, { id: t2 }, { id: t3 }]
judges: [{ id: s1 }, { id: s2 }]
rounds:
  - { id: easy, order: 1, status: ongoing, active: [t1, t2, t3] }
"#,
        )
        .unwrap();
        let round = &event.rounds[0];
        let sheet = sheet(vec![
            ("s1", "t1", vec![("correct", "3"), ("wrong", "1")]),
            ("s2", "t1", vec![("bonus", "1")]),
            ("s1", "t2", vec![("correct", "4")]),
        ]);

        let computed = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap();
        assert!(computed.entries.iter().all(|e| e.criterion.is_none()));
        assert_eq!(total(&computed, "t1"), Some((fx("8"), fx("1.5"))));
        assert_eq!(total(&computed, "t2"), Some((fx("8"), fx("1.5"))));
        assert!(total(&computed, "t3").is_none());
        assert!(!computed.complete);
    }

    #[test]
    fn test_pointing_sum_overflow_is_an_error() {
        let mut event = event();
        event.rounds[1].criteria[1].max = Some(Fixed::from_int(5_000_000_000_000));
        let round = event.round("final").unwrap();
        let sheet = sheet(vec![
            ("j1", "c1", vec![("qa", "5000000000000"), ("gown", "1")]),
            ("j2", "c1", vec![("qa", "5000000000000"), ("gown", "1")]),
        ]);

        let err = compute_round_entries(&event, round, &sheet, &DerivedSources::new()).unwrap_err();
        assert!(matches!(
            err,
            TallyError::Overflow { ref contestant, .. } if contestant == "c1"
        ));
    }

    #[test]
    fn test_orw_sum_overflow_is_an_error() {
        let event = parse_event(
            r#"
id: quiz
kind: { orw: { correct: 1000000 } }
contestants: [{ id: t1 }]
judges: [{ id: s1 }, { id: s2 }]
rounds:
  - { id: easy, order: 1, status: ongoing, active: [t1] }
"#,
        )
        .unwrap();
        // Each scorer alone fits; their sum does not
        let sheet = sheet(vec![
            ("s1", "t1", vec![("correct", "5000000")]),
            ("s2", "t1", vec![("correct", "5000000")]),
        ]);

        let err =
            compute_round_entries(&event, &event.rounds[0], &sheet, &DerivedSources::new()).unwrap_err();
        assert!(matches!(err, TallyError::Overflow { .. }));
    }
}
