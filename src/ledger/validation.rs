use std::collections::HashSet;

use super::types::{ScoreCard, ScoreRow};
use crate::event::{Event, EventKind, Round, RoundStatus};
use crate::fixed::Fixed;
use crate::scoring::error::ValidationError;
use crate::scoring::orw::OrwOutcome;

/// Validate a whole score card before any of it is written.
/// Returns all problems at once (not just the first).
pub fn validate_card(
    event: &Event,
    round: &Round,
    card: &ScoreCard,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if event.judge(&card.judge).is_none() {
        errors.push(ValidationError::UnknownJudge {
            judge: card.judge.clone(),
        });
    }

    if round.status != RoundStatus::Ongoing {
        errors.push(ValidationError::RoundNotOpen {
            round: round.id.clone(),
            status: round.status,
        });
    }

    let mut seen = HashSet::new();
    for row in &card.rows {
        if !seen.insert(row.contestant.as_str()) {
            errors.push(ValidationError::DuplicateContestant {
                contestant: row.contestant.clone(),
            });
            continue;
        }

        if !round.is_active(&row.contestant) {
            errors.push(ValidationError::ContestantNotActive {
                round: round.id.clone(),
                contestant: row.contestant.clone(),
            });
            continue;
        }

        match &event.kind {
            EventKind::Criteria => validate_criteria_row(round, row, &mut errors),
            EventKind::Orw(_) => validate_orw_row(row, &mut errors),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_criteria_row(round: &Round, row: &ScoreRow, errors: &mut Vec<ValidationError>) {
    for criterion in &round.criteria {
        let value = row.values.get(&criterion.id);
        match (&criterion.derived_from, value) {
            (Some(source_round), Some(_)) => errors.push(ValidationError::DerivedInput {
                contestant: row.contestant.clone(),
                criterion: criterion.id.clone(),
                source_round: source_round.clone(),
            }),
            (Some(_), None) => {}
            (None, None) => errors.push(ValidationError::MissingValue {
                contestant: row.contestant.clone(),
                criterion: criterion.id.clone(),
            }),
            (None, Some(&value)) => {
                if let Some((min, max)) = criterion.bounds() {
                    if value < min || value > max {
                        errors.push(ValidationError::OutOfRange {
                            contestant: row.contestant.clone(),
                            criterion: criterion.id.clone(),
                            value,
                            min,
                            max,
                        });
                    }
                }
            }
        }
    }

    for key in row.values.keys() {
        if round.criterion(key).is_none() {
            errors.push(ValidationError::UnknownCriterion {
                contestant: row.contestant.clone(),
                criterion: key.clone(),
            });
        }
    }
}

fn validate_orw_row(row: &ScoreRow, errors: &mut Vec<ValidationError>) {
    for (key, &value) in &row.values {
        if OrwOutcome::from_key(key).is_none() {
            errors.push(ValidationError::UnknownOutcome {
                contestant: row.contestant.clone(),
                key: key.clone(),
            });
        } else if value < Fixed::ZERO || !value.is_whole() {
            errors.push(ValidationError::InvalidCount {
                contestant: row.contestant.clone(),
                key: key.clone(),
                value,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event;
    use std::collections::BTreeMap;

    fn event() -> Event {
        parse_event(
            r#"
id: e
contestants: [{ id: c1 }, { id: c2 }, { id: c3 }]
judges: [{ id: j1 }, { id: j2 }]
rounds:
  - id: prelim
    order: 1
    status: finished
    active: [c1, c2]
    criteria:
      - { id: poise, weight: 100, min: 0, max: 100 }
  - id: final
    order: 2
    status: ongoing
    active: [c1, c2]
    criteria:
      - { id: carry, derived_from: prelim }
      - { id: qa, weight: 100, min: 0, max: 10 }
  - id: talent
    order: 3
    status: ongoing
    regime: pointing
    active: [c1, c2]
    criteria:
      - { id: tricks, min: 0, max: 5 }
"#,
        )
        .unwrap()
    }

    fn card(round: &str, judge: &str, rows: Vec<(&str, Vec<(&str, &str)>)>) -> ScoreCard {
        ScoreCard {
            round: round.to_string(),
            judge: judge.to_string(),
            rows: rows
                .into_iter()
                .map(|(contestant, values)| ScoreRow {
                    contestant: contestant.to_string(),
                    values: values
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.parse().unwrap()))
                        .collect::<BTreeMap<_, _>>(),
                })
                .collect(),
        }
    }

    fn check(card: &ScoreCard) -> Result<(), Vec<ValidationError>> {
        let event = event();
        let round = event.round(&card.round).unwrap().clone();
        validate_card(&event, &round, card)
    }

    #[test]
    fn test_valid_card() {
        let c = card("final", "j1", vec![("c1", vec![("qa", "7.5")]), ("c2", vec![("qa", "10")])]);
        assert!(check(&c).is_ok());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let c = card("final", "j1", vec![("c1", vec![("qa", "0")]), ("c2", vec![("qa", "10")])]);
        assert!(check(&c).is_ok());
    }

    #[test]
    fn test_out_of_range() {
        let errors = check(&card("final", "j1", vec![("c1", vec![("qa", "10.01")])])).unwrap_err();
        assert!(matches!(errors[0], ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_pointing_round_enforces_bounds() {
        let ok = card("talent", "j1", vec![("c1", vec![("tricks", "5")])]);
        assert!(check(&ok).is_ok());

        let errors = check(&card(
            "talent",
            "j1",
            vec![("c1", vec![("tricks", "6")]), ("c2", vec![("tricks", "-1")])],
        ))
        .unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::OutOfRange {
                    contestant: "c1".to_string(),
                    criterion: "tricks".to_string(),
                    value: Fixed::from_int(6),
                    min: Fixed::ZERO,
                    max: Fixed::from_int(5),
                },
                ValidationError::OutOfRange {
                    contestant: "c2".to_string(),
                    criterion: "tricks".to_string(),
                    value: Fixed::from_int(-1),
                    min: Fixed::ZERO,
                    max: Fixed::from_int(5),
                },
            ]
        );
    }

    #[test]
    fn test_missing_value() {
        let errors = check(&card("final", "j1", vec![("c1", vec![])])).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MissingValue {
                contestant: "c1".to_string(),
                criterion: "qa".to_string(),
            }]
        );
    }

    #[test]
    fn test_derived_criterion_rejects_input() {
        let errors =
            check(&card("final", "j1", vec![("c1", vec![("qa", "5"), ("carry", "80")])])).unwrap_err();
        assert!(matches!(errors[0], ValidationError::DerivedInput { .. }));
    }

    #[test]
    fn test_round_not_open() {
        let errors = check(&card("prelim", "j1", vec![("c1", vec![("poise", "50")])])).unwrap_err();
        assert!(matches!(errors[0], ValidationError::RoundNotOpen { .. }));
    }

    #[test]
    fn test_inactive_contestant_and_unknown_judge() {
        let errors = check(&card("final", "j9", vec![("c3", vec![("qa", "5")])])).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::UnknownJudge { .. }));
        assert!(matches!(errors[1], ValidationError::ContestantNotActive { .. }));
    }

    #[test]
    fn test_unknown_criterion_and_duplicate_row() {
        let errors = check(&card(
            "final",
            "j1",
            vec![("c1", vec![("qa", "5"), ("talent", "5")]), ("c1", vec![("qa", "6")])],
        ))
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::UnknownCriterion { .. }));
        assert!(matches!(errors[1], ValidationError::DuplicateContestant { .. }));
    }

    #[test]
    fn test_orw_counts() {
        let event = parse_event(
            r#"
id: quiz
kind: { orw: { correct: 1 } }
contestants: [{ id: t1 }]
judges: [{ id: s1 }]
rounds:
  - { id: easy, order: 1, status: ongoing, active: [t1] }
"#,
        )
        .unwrap();
        let round = event.rounds[0].clone();

        let ok = card("easy", "s1", vec![("t1", vec![("correct", "4"), ("wrong", "0")])]);
        assert!(validate_card(&event, &round, &ok).is_ok());

        let bad = card("easy", "s1", vec![("t1", vec![("correct", "1.5"), ("partial", "1")])]);
        let errors = validate_card(&event, &round, &bad).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::InvalidCount { .. }));
        assert!(matches!(errors[1], ValidationError::UnknownOutcome { .. }));
    }
}
