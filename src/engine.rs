//! Round lifecycle and recompute orchestration over one event.

use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::event::{ContestantId, Event, RoundId, RoundStatus};
use crate::ledger::{ScoreCard, ScoreLedger, Submission};
use crate::output::{build_round_view, RoundView};
use crate::scoring::{
    combine_rounds, compute_round_entries, dependents_of, is_fully_scored, resolve_derived,
    validate_event, winners, OverallTally, RoundTally, TallyError, TallyStore, TieBreak, Winners,
};
use crate::storage::{EngineState, STATE_VERSION};

/// Result of one round recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct RecomputeOutcome {
    pub tally: RoundTally,
    /// Rounds deriving from this one whose results are now stale
    pub stale_dependents: Vec<RoundId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub rows: usize,
    /// Set when the submission completed the judge's card and the round was recomputed
    pub recomputed: Option<RecomputeOutcome>,
}

/// Thread-safe handle over one event's ledger and results.
///
/// Lock order is event, then a round's results slot, then ledger cards. A
/// recompute only reads the results of strictly earlier rounds, so two
/// recomputes never wait on each other in a cycle.
#[derive(Debug)]
pub struct Tabulator {
    event: RwLock<Event>,
    ledger: ScoreLedger,
    results: TallyStore,
    overall: Mutex<Option<OverallTally>>,
}

impl Tabulator {
    pub fn new(event: Event) -> Result<Self, TallyError> {
        validate_event(&event).map_err(TallyError::InvalidEvent)?;
        Ok(Self {
            event: RwLock::new(event),
            ledger: ScoreLedger::new(),
            results: TallyStore::new(),
            overall: Mutex::new(None),
        })
    }

    fn read_event(&self) -> RwLockReadGuard<'_, Event> {
        self.event.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_event(&self) -> RwLockWriteGuard<'_, Event> {
        self.event.write().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_overall(&self) {
        *self.overall.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn event(&self) -> Event {
        self.read_event().clone()
    }

    /// Open a round for scoring, optionally replacing its active contestants.
    ///
    /// Reopening an ongoing round only changes the active set. The round is
    /// marked for recompute so removed contestants drop out of its results.
    pub fn open_round(&self, round: &str, active: Option<Vec<ContestantId>>) -> Result<(), TallyError> {
        let mut event = self.write_event();
        if let Some(unknown) = active
            .iter()
            .flatten()
            .find(|c| event.contestant(c).is_none())
        {
            return Err(TallyError::UnknownContestant(unknown.clone()));
        }

        let target = event
            .round_mut(round)
            .ok_or_else(|| TallyError::UnknownRound(round.to_string()))?;
        if target.status == RoundStatus::Finished {
            return Err(TallyError::InvalidTransition {
                round: round.to_string(),
                status: target.status,
                expected: RoundStatus::Pending,
            });
        }

        if let Some(active) = active {
            target.active = active;
        }
        target.status = RoundStatus::Ongoing;
        info!(round, active = target.active.len(), "round opened");
        drop(event);

        self.ledger.mark_touched(round);
        Ok(())
    }

    pub fn submit(&self, submission: Submission) -> Result<SubmitOutcome, TallyError> {
        self.submit_card(submission.into())
    }

    /// Store a judge's batch. When it leaves the judge with a row for every
    /// active contestant, the round is recomputed right away. A round that
    /// cannot be tallied keeps its previous results; the accepted rows stay
    /// stored either way.
    pub fn submit_card(&self, card: ScoreCard) -> Result<SubmitOutcome, TallyError> {
        let event = self.read_event();
        let round = card.round.clone();
        let judge = card.judge.clone();
        let rows = self.ledger.submit_card(&event, card)?;

        let active = event
            .round(&round)
            .map(|r| r.active.as_slice())
            .unwrap_or_default();
        let recomputed = if self.ledger.has_full_card(&round, &judge, active) {
            match self.recompute(&event, &round) {
                Ok(outcome) => Some(outcome),
                Err(e) if e.is_not_ready() => {
                    debug!(round = %round, error = %e, "recompute deferred");
                    None
                }
                Err(e) => {
                    warn!(round = %round, error = %e, "recompute failed after submission");
                    None
                }
            }
        } else {
            None
        };

        Ok(SubmitOutcome { rows, recomputed })
    }

    /// Recompute one round from the current ledger.
    pub fn compute_round_tally(&self, round: &str) -> Result<RecomputeOutcome, TallyError> {
        let event = self.read_event();
        self.recompute(&event, round)
    }

    fn recompute(&self, event: &Event, round_id: &str) -> Result<RecomputeOutcome, TallyError> {
        let round = event
            .round(round_id)
            .ok_or_else(|| TallyError::UnknownRound(round_id.to_string()))?;

        debug!(round = round_id, "recomputing round");
        let tally = self.results.replace_with(round_id, || {
            let sources = resolve_derived(event, round, &self.results)?;
            self.ledger.clear_touched(round_id);
            let sheet = self.ledger.snapshot(round_id);
            compute_round_entries(event, round, &sheet, &sources).inspect_err(|_| {
                self.ledger.mark_touched(round_id);
            })
        })?;
        info!(
            round = round_id,
            generation = tally.generation,
            entries = tally.entries.len(),
            complete = tally.complete,
            "round tally computed"
        );

        let mut stale_dependents = Vec::new();
        if round.status == RoundStatus::Finished {
            self.clear_overall();
            for dependent in dependents_of(event, round_id) {
                if self.results.mark_stale(&dependent) {
                    stale_dependents.push(dependent);
                }
            }
            if !stale_dependents.is_empty() {
                warn!(
                    round = round_id,
                    dependents = ?stale_dependents,
                    "finished round recomputed; dependent rounds are stale"
                );
            }
        }

        Ok(RecomputeOutcome {
            tally,
            stale_dependents,
        })
    }

    /// Finish a round. The closing recompute is mandatory: if it fails the
    /// round goes back to ongoing and keeps its previous results.
    pub fn close_round(&self, round: &str) -> Result<RecomputeOutcome, TallyError> {
        self.transition(round, RoundStatus::Ongoing, RoundStatus::Finished)?;

        let result = {
            let event = self.read_event();
            self.recompute(&event, round)
        };
        match result {
            Ok(outcome) => {
                info!(round, generation = outcome.tally.generation, "round closed");
                Ok(outcome)
            }
            Err(e) => {
                warn!(round, error = %e, "closing recompute failed; round stays ongoing");
                self.transition(round, RoundStatus::Finished, RoundStatus::Ongoing)?;
                Err(e)
            }
        }
    }

    /// Put a finished round back into scoring for corrections. Closing it again
    /// recomputes it and marks every round deriving from it stale.
    pub fn reopen_round(&self, round: &str) -> Result<(), TallyError> {
        self.transition(round, RoundStatus::Finished, RoundStatus::Ongoing)?;
        self.clear_overall();
        info!(round, "round reopened");
        Ok(())
    }

    fn transition(&self, round: &str, from: RoundStatus, to: RoundStatus) -> Result<(), TallyError> {
        let mut event = self.write_event();
        let target = event
            .round_mut(round)
            .ok_or_else(|| TallyError::UnknownRound(round.to_string()))?;
        if target.status != from {
            return Err(TallyError::InvalidTransition {
                round: round.to_string(),
                status: target.status,
                expected: from,
            });
        }
        target.status = to;
        Ok(())
    }

    pub fn round_tally(&self, round: &str) -> Option<RoundTally> {
        self.results.get(round)
    }

    pub fn is_fully_scored(&self, round: &str) -> Result<bool, TallyError> {
        let event = self.read_event();
        let definition = event
            .round(round)
            .ok_or_else(|| TallyError::UnknownRound(round.to_string()))?;
        Ok(is_fully_scored(&event, definition, &self.ledger.snapshot(round)))
    }

    /// Whether submissions arrived since the round's last recompute.
    pub fn is_touched(&self, round: &str) -> bool {
        self.ledger.is_touched(round)
    }

    pub fn submitted_judge_count(&self, round: &str) -> usize {
        self.ledger.submitted_judge_count(round)
    }

    pub fn has_submitted(&self, round: &str, judge: &str) -> bool {
        self.ledger.has_submitted(round, judge)
    }

    /// Combine all finished rounds and keep the result as the current overall.
    pub fn compute_overall(&self) -> Result<OverallTally, TallyError> {
        let event = self.read_event();
        let overall = combine_rounds(&event, &self.results)?;
        info!(
            rounds = overall.rounds.len(),
            entries = overall.entries.len(),
            "overall computed"
        );
        *self.overall.lock().unwrap_or_else(|e| e.into_inner()) = Some(overall.clone());
        Ok(overall)
    }

    /// Last overall computed since any finished round changed.
    pub fn overall(&self) -> Option<OverallTally> {
        self.overall.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn winners(&self, n: usize, tie_break: TieBreak) -> Result<Winners, TallyError> {
        let overall = match self.overall() {
            Some(overall) => overall,
            None => self.compute_overall()?,
        };
        let event = self.read_event();
        Ok(winners(&event, &overall, n, tie_break))
    }

    pub fn round_view(&self, round: &str) -> Result<RoundView, TallyError> {
        let event = self.read_event();
        let definition = event
            .round(round)
            .ok_or_else(|| TallyError::UnknownRound(round.to_string()))?;
        let sheet = self.ledger.snapshot(round);
        let tally = self.results.get(round);
        Ok(build_round_view(&event, definition, &sheet, tally.as_ref()))
    }

    pub fn export_state(&self) -> EngineState {
        EngineState {
            version: STATE_VERSION,
            event: self.event(),
            ledger: self.ledger.export(),
            results: self.results.export(),
            overall: self.overall(),
        }
    }

    pub fn from_state(state: EngineState) -> Result<Self, TallyError> {
        validate_event(&state.event).map_err(TallyError::InvalidEvent)?;
        Ok(Self {
            event: RwLock::new(state.event),
            ledger: ScoreLedger::restore(state.ledger),
            results: TallyStore::restore(state.results),
            overall: Mutex::new(state.overall),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_event;
    use crate::fixed::Fixed;
    use crate::ledger::ScoreRow;
    use std::collections::BTreeMap;

    fn fx(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    fn tabulator() -> Tabulator {
        let event = parse_event(
            r#"
id: pageant
contestants: [{ id: c1 }, { id: c2 }, { id: c3 }]
judges: [{ id: j1 }, { id: j2 }]
rounds:
  - id: prelim
    order: 1
    criteria:
      - { id: poise, weight: 40, min: 0, max: 100 }
      - { id: wit, weight: 35, min: 0, max: 100 }
      - { id: style, weight: 25, min: 0, max: 100 }
  - id: final
    order: 2
    regime: pointing
    criteria:
      - { id: carry, derived_from: prelim }
      - { id: qa, min: 0, max: 10 }
"#,
        )
        .unwrap();
        Tabulator::new(event).unwrap()
    }

    fn row(contestant: &str, values: &[(&str, &str)]) -> ScoreRow {
        ScoreRow {
            contestant: contestant.to_string(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), fx(v)))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn card(round: &str, judge: &str, rows: Vec<ScoreRow>) -> ScoreCard {
        ScoreCard {
            round: round.to_string(),
            judge: judge.to_string(),
            rows,
        }
    }

    fn prelim_row(contestant: &str, poise: &str, wit: &str, style: &str) -> ScoreRow {
        row(contestant, &[("poise", poise), ("wit", wit), ("style", style)])
    }

    fn score_prelim(t: &Tabulator) {
        t.open_round("prelim", Some(vec!["c1".into(), "c2".into()])).unwrap();
        for judge in ["j1", "j2"] {
            t.submit_card(card(
                "prelim",
                judge,
                vec![prelim_row("c1", "80", "90", "70"), prelim_row("c2", "70", "70", "70")],
            ))
            .unwrap();
        }
    }

    #[test]
    fn test_invalid_event_rejected() {
        let mut event = tabulator().event();
        event.rounds[0].criteria[0].weight = Some(fx("10"));
        assert!(matches!(Tabulator::new(event), Err(TallyError::InvalidEvent(_))));
    }

    #[test]
    fn test_submission_requires_open_round() {
        let t = tabulator();
        let err = t
            .submit_card(card("prelim", "j1", vec![prelim_row("c1", "80", "90", "70")]))
            .unwrap_err();
        assert!(matches!(err, TallyError::Rejected { .. }));
    }

    #[test]
    fn test_full_card_triggers_recompute() {
        let t = tabulator();
        t.open_round("prelim", Some(vec!["c1".into(), "c2".into()])).unwrap();

        let partial = t
            .submit_card(card("prelim", "j1", vec![prelim_row("c1", "80", "90", "70")]))
            .unwrap();
        assert!(partial.recomputed.is_none());
        assert!(t.is_touched("prelim"));

        let full = t
            .submit_card(card("prelim", "j1", vec![prelim_row("c2", "70", "70", "70")]))
            .unwrap();
        let outcome = full.recomputed.unwrap();
        assert_eq!(outcome.tally.generation, 1);
        assert_eq!(outcome.tally.total_for("c1").unwrap().score, fx("81"));
        assert!(!t.is_touched("prelim"));
        assert_eq!(t.submitted_judge_count("prelim"), 1);
        assert!(!t.is_fully_scored("prelim").unwrap());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let t = tabulator();
        score_prelim(&t);
        let first = t.compute_round_tally("prelim").unwrap().tally;
        let second = t.compute_round_tally("prelim").unwrap().tally;
        assert_eq!(first.entries, second.entries);
        assert_eq!(second.generation, first.generation + 1);
    }

    #[test]
    fn test_derived_round_waits_for_source() {
        let t = tabulator();
        score_prelim(&t);
        t.open_round("final", Some(vec!["c1".into(), "c2".into(), "c3".into()])).unwrap();

        let err = t.compute_round_tally("final").unwrap_err();
        assert!(err.is_not_ready());
        assert!(t.round_tally("final").is_none());

        t.close_round("prelim").unwrap();
        t.submit(Submission {
            round: "final".to_string(),
            judge: "j1".to_string(),
            contestant: "c1".to_string(),
            values: BTreeMap::from([("qa".to_string(), fx("3"))]),
        })
        .unwrap();

        let tally = t.compute_round_tally("final").unwrap().tally;
        let carry = tally.criterion_entry("carry", "c1").unwrap();
        assert_eq!(carry.score, fx("81"));
        assert_eq!(tally.total_for("c1").unwrap().score, fx("84"));
        // c2 has no final scores yet, c3 never scored
        assert!(tally.total_for("c2").is_none());
    }

    #[test]
    fn test_overflowing_round_keeps_previous_tally() {
        let mut event = tabulator().event();
        event.rounds[1].criteria[1].max = Some(Fixed::from_int(5_000_000_000_000));
        let t = Tabulator::new(event).unwrap();
        score_prelim(&t);
        t.close_round("prelim").unwrap();
        t.open_round("final", Some(vec!["c1".into()])).unwrap();

        let huge = [("qa", "5000000000000")];
        let first = t.submit_card(card("final", "j1", vec![row("c1", &huge)])).unwrap();
        assert_eq!(first.recomputed.unwrap().tally.generation, 1);

        // Accepted, but the judges' sum no longer fits
        let second = t.submit_card(card("final", "j2", vec![row("c1", &huge)])).unwrap();
        assert_eq!(second.rows, 1);
        assert!(second.recomputed.is_none());
        assert_eq!(t.round_tally("final").unwrap().generation, 1);
        assert!(t.is_touched("final"));

        let err = t.compute_round_tally("final").unwrap_err();
        assert!(matches!(err, TallyError::Overflow { .. }));
        assert!(!err.is_not_ready());
    }

    #[test]
    fn test_close_failure_reverts_status() {
        let t = tabulator();
        t.open_round("final", None).unwrap();
        assert!(t.close_round("final").is_err());
        let status = t.event().round("final").unwrap().status;
        assert_eq!(status, RoundStatus::Ongoing);
    }

    #[test]
    fn test_close_requires_ongoing() {
        let t = tabulator();
        let err = t.close_round("prelim").unwrap_err();
        assert!(matches!(err, TallyError::InvalidTransition { .. }));
        assert!(matches!(t.close_round("nope"), Err(TallyError::UnknownRound(_))));
    }

    #[test]
    fn test_correction_cascades_stale() {
        let t = tabulator();
        score_prelim(&t);
        t.close_round("prelim").unwrap();
        t.open_round("final", Some(vec!["c1".into()])).unwrap();
        let submitted = t
            .submit_card(card("final", "j1", vec![row("c1", &[("qa", "3")])]))
            .unwrap();
        let before = submitted.recomputed.unwrap().tally;
        assert_eq!(before.criterion_entry("carry", "c1").unwrap().score, fx("81"));

        t.reopen_round("prelim").unwrap();
        t.submit_card(card("prelim", "j2", vec![prelim_row("c1", "100", "100", "100")]))
            .unwrap();
        let outcome = t.close_round("prelim").unwrap();
        assert_eq!(outcome.stale_dependents, vec!["final"]);
        assert!(t.round_tally("final").unwrap().stale);

        t.close_round("final").unwrap();
        let tally = t.round_tally("final").unwrap();
        assert!(!tally.stale);
        // (80 + 100) / 2 × 40% + (90 + 100) / 2 × 35% + (70 + 100) / 2 × 25%
        assert_eq!(tally.criterion_entry("carry", "c1").unwrap().score, fx("90.5"));
    }

    #[test]
    fn test_ghost_removal_on_reopen() {
        let t = tabulator();
        score_prelim(&t);
        assert!(t.round_tally("prelim").unwrap().total_for("c2").is_some());

        t.open_round("prelim", Some(vec!["c1".into()])).unwrap();
        assert!(t.is_touched("prelim"));
        let tally = t.compute_round_tally("prelim").unwrap().tally;
        assert!(tally.entries.iter().all(|e| e.contestant != "c2"));
    }

    #[test]
    fn test_open_round_checks() {
        let t = tabulator();
        assert!(matches!(
            t.open_round("prelim", Some(vec!["c9".into()])),
            Err(TallyError::UnknownContestant(_))
        ));
        score_prelim(&t);
        t.close_round("prelim").unwrap();
        assert!(matches!(
            t.open_round("prelim", None),
            Err(TallyError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_overall_and_winners() {
        let t = tabulator();
        score_prelim(&t);
        t.close_round("prelim").unwrap();

        let overall = t.compute_overall().unwrap();
        assert_eq!(overall.rounds, vec!["prelim"]);
        assert_eq!(overall.entries[0].contestant, "c1");
        assert_eq!(overall.entries[0].score, fx("81"));

        let top = t.winners(1, TieBreak::Roster).unwrap();
        assert_eq!(top.entries[0].contestant, "c1");
        assert!(!top.tied_at_cutoff);

        t.reopen_round("prelim").unwrap();
        assert!(t.overall().is_none());
    }

    #[test]
    fn test_round_view() {
        let t = tabulator();
        score_prelim(&t);
        let view = t.round_view("prelim").unwrap();
        assert!(view.complete);
        assert_eq!(view.filled_cells, 4);
        assert_eq!(view.criteria.len(), 3);
        assert_eq!(view.rows[0].total, Some(fx("81")));
    }

    #[test]
    fn test_concurrent_judges_and_recomputes() {
        let t = tabulator();
        t.open_round("prelim", Some(vec!["c1".into(), "c2".into()])).unwrap();

        std::thread::scope(|scope| {
            for judge in ["j1", "j2"] {
                let t = &t;
                scope.spawn(move || {
                    for _ in 0..20 {
                        t.submit_card(card(
                            "prelim",
                            judge,
                            vec![prelim_row("c1", "80", "90", "70"), prelim_row("c2", "70", "70", "70")],
                        ))
                        .unwrap();
                    }
                });
            }
            let t = &t;
            scope.spawn(move || {
                for _ in 0..20 {
                    t.compute_round_tally("prelim").unwrap();
                }
            });
        });

        let tally = t.compute_round_tally("prelim").unwrap().tally;
        assert!(tally.complete);
        assert_eq!(tally.total_for("c1").unwrap().score, fx("81"));
        assert_eq!(tally.total_for("c2").unwrap().score, fx("70"));
    }

    #[test]
    fn test_state_round_trip() {
        let t = tabulator();
        score_prelim(&t);
        t.close_round("prelim").unwrap();
        t.compute_overall().unwrap();

        let restored = Tabulator::from_state(t.export_state()).unwrap();
        assert_eq!(restored.round_tally("prelim"), t.round_tally("prelim"));
        assert_eq!(restored.overall(), t.overall());
        assert_eq!(restored.event(), t.event());
    }
}
