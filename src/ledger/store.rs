use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

use super::types::{LedgerSnapshot, RawScores, RoundSheet, ScoreCard, Submission};
use super::validation::validate_card;
use crate::event::{ContestantId, Event, JudgeId, RoundId};
use crate::scoring::error::TallyError;

type JudgeCard = BTreeMap<ContestantId, RawScores>;

#[derive(Debug, Default)]
struct RoundLedger {
    cards: RwLock<HashMap<JudgeId, Arc<Mutex<JudgeCard>>>>,
    touched: AtomicBool,
}

impl RoundLedger {
    fn card(&self, judge: &str) -> Arc<Mutex<JudgeCard>> {
        if let Some(card) = self.cards.read().unwrap_or_else(|e| e.into_inner()).get(judge) {
            return card.clone();
        }
        self.cards
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(judge.to_string())
            .or_default()
            .clone()
    }

    fn existing_card(&self, judge: &str) -> Option<Arc<Mutex<JudgeCard>>> {
        self.cards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(judge)
            .cloned()
    }
}

/// Thread-safe store of raw judge scores.
///
/// Each (round, judge) card has its own lock: a judge's batch replaces its rows
/// atomically while other judges write to the same round in parallel.
#[derive(Debug, Default)]
pub struct ScoreLedger {
    rounds: RwLock<HashMap<RoundId, Arc<RoundLedger>>>,
}

impl ScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn round(&self, round: &str) -> Arc<RoundLedger> {
        if let Some(ledger) = self.rounds.read().unwrap_or_else(|e| e.into_inner()).get(round) {
            return ledger.clone();
        }
        self.rounds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(round.to_string())
            .or_default()
            .clone()
    }

    fn existing_round(&self, round: &str) -> Option<Arc<RoundLedger>> {
        self.rounds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(round)
            .cloned()
    }

    /// Validate and store a judge's card for a round.
    ///
    /// Every row is checked before anything is written, so a rejected card leaves
    /// the ledger untouched. Accepted rows replace the judge's previous rows for
    /// the same contestants. Returns the number of rows written.
    pub fn submit_card(&self, event: &Event, card: ScoreCard) -> Result<usize, TallyError> {
        let round = event
            .round(&card.round)
            .ok_or_else(|| TallyError::UnknownRound(card.round.clone()))?;

        if let Err(reasons) = validate_card(event, round, &card) {
            debug!(round = %card.round, judge = %card.judge, reasons = reasons.len(), "score card rejected");
            return Err(TallyError::Rejected {
                round: card.round,
                judge: card.judge,
                reasons,
            });
        }

        let round_ledger = self.round(&card.round);
        let slot = round_ledger.card(&card.judge);
        let submitted_at = Utc::now();
        let written = card.rows.len();
        {
            let mut rows = slot.lock().unwrap_or_else(|e| e.into_inner());
            for row in card.rows {
                rows.insert(
                    row.contestant,
                    RawScores {
                        values: row.values,
                        submitted_at,
                    },
                );
            }
        }
        if written > 0 {
            round_ledger.touched.store(true, Ordering::Release);
        }

        info!(round = %card.round, judge = %card.judge, rows = written, "score card accepted");
        Ok(written)
    }

    pub fn submit(&self, event: &Event, submission: Submission) -> Result<(), TallyError> {
        self.submit_card(event, submission.into()).map(|_| ())
    }

    /// Number of judges with at least one stored row for the round.
    pub fn submitted_judge_count(&self, round: &str) -> usize {
        let Some(ledger) = self.existing_round(round) else {
            return 0;
        };
        let cards = ledger.cards.read().unwrap_or_else(|e| e.into_inner());
        cards
            .values()
            .filter(|card| !card.lock().unwrap_or_else(|e| e.into_inner()).is_empty())
            .count()
    }

    pub fn has_submitted(&self, round: &str, judge: &str) -> bool {
        self.existing_round(round)
            .and_then(|ledger| ledger.existing_card(judge))
            .is_some_and(|card| !card.lock().unwrap_or_else(|e| e.into_inner()).is_empty())
    }

    /// Whether `judge` has a row for every contestant in `active`.
    pub fn has_full_card(&self, round: &str, judge: &str, active: &[ContestantId]) -> bool {
        let Some(card) = self
            .existing_round(round)
            .and_then(|ledger| ledger.existing_card(judge))
        else {
            return false;
        };
        let rows = card.lock().unwrap_or_else(|e| e.into_inner());
        !active.is_empty() && active.iter().all(|c| rows.contains_key(c))
    }

    /// Whether submissions arrived since the round was last tallied.
    pub fn is_touched(&self, round: &str) -> bool {
        self.existing_round(round)
            .is_some_and(|ledger| ledger.touched.load(Ordering::Acquire))
    }

    pub fn clear_touched(&self, round: &str) {
        if let Some(ledger) = self.existing_round(round) {
            ledger.touched.store(false, Ordering::Release);
        }
    }

    pub fn mark_touched(&self, round: &str) {
        self.round(round).touched.store(true, Ordering::Release);
    }

    /// Owned copy of a round's rows.
    pub fn snapshot(&self, round: &str) -> RoundSheet {
        let Some(ledger) = self.existing_round(round) else {
            return RoundSheet::default();
        };
        let cards = ledger.cards.read().unwrap_or_else(|e| e.into_inner());
        RoundSheet {
            cards: cards
                .iter()
                .map(|(judge, card)| {
                    let rows = card.lock().unwrap_or_else(|e| e.into_inner()).clone();
                    (judge.clone(), rows)
                })
                .filter(|(_, rows)| !rows.is_empty())
                .collect(),
        }
    }

    pub fn export(&self) -> LedgerSnapshot {
        let round_ids: Vec<RoundId> = self
            .rounds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();

        let mut snapshot = LedgerSnapshot::default();
        for round in round_ids {
            if self.is_touched(&round) {
                snapshot.touched.insert(round.clone());
            }
            let sheet = self.snapshot(&round);
            if !sheet.cards.is_empty() {
                snapshot.rounds.insert(round, sheet);
            }
        }
        snapshot
    }

    pub fn restore(snapshot: LedgerSnapshot) -> Self {
        let ledger = Self::new();
        for (round, sheet) in snapshot.rounds {
            let round_ledger = ledger.round(&round);
            for (judge, rows) in sheet.cards {
                *round_ledger
                    .card(&judge)
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = rows;
            }
        }
        for round in snapshot.touched {
            ledger.mark_touched(&round);
        }
        ledger
    }
}
