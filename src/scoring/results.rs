use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use super::error::TallyError;
use crate::event::{ContestantId, CriterionId, RoundId};
use crate::fixed::Fixed;

/// One computed score: a per-criterion aggregate when `criterion` is set,
/// otherwise the contestant's round total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedEntry {
    pub round: RoundId,
    pub contestant: ContestantId,
    #[serde(default)]
    pub criterion: Option<CriterionId>,
    pub score: Fixed,
    pub rank: Fixed,
}

/// Output of one tally pass before it is stamped with a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedRound {
    pub entries: Vec<ComputedEntry>,
    pub complete: bool,
}

/// One generation of a round's computed entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTally {
    pub round: RoundId,
    pub generation: u64,
    pub computed_at: DateTime<Utc>,
    /// Every active contestant has every judge's value for every scored criterion
    pub complete: bool,
    /// A round this one derives from was recomputed after this generation
    #[serde(default)]
    pub stale: bool,
    pub entries: Vec<ComputedEntry>,
}

impl RoundTally {
    pub fn totals(&self) -> impl Iterator<Item = &ComputedEntry> {
        self.entries.iter().filter(|e| e.criterion.is_none())
    }

    pub fn total_for(&self, contestant: &str) -> Option<&ComputedEntry> {
        self.totals().find(|e| e.contestant == contestant)
    }

    pub fn criterion_entries<'a>(
        &'a self,
        criterion: &'a str,
    ) -> impl Iterator<Item = &'a ComputedEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.criterion.as_deref() == Some(criterion))
    }

    pub fn criterion_entry<'a>(
        &'a self,
        criterion: &'a str,
        contestant: &str,
    ) -> Option<&'a ComputedEntry> {
        self.criterion_entries(criterion)
            .find(|e| e.contestant == contestant)
    }

    /// Round totals keyed by contestant.
    pub fn total_map(&self) -> BTreeMap<ContestantId, Fixed> {
        self.totals()
            .map(|e| (e.contestant.clone(), e.score))
            .collect()
    }
}

type Slot = Arc<Mutex<Option<RoundTally>>>;

/// Computed results per round.
///
/// A recompute holds the round's slot for the whole compute-then-swap, so two
/// recomputes of one round never interleave while different rounds proceed
/// in parallel.
#[derive(Debug, Default)]
pub struct TallyStore {
    rounds: RwLock<HashMap<RoundId, Slot>>,
}

impl TallyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, round: &str) -> Slot {
        if let Some(slot) = self.rounds.read().unwrap_or_else(|e| e.into_inner()).get(round) {
            return slot.clone();
        }
        self.rounds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(round.to_string())
            .or_default()
            .clone()
    }

    fn existing_slot(&self, round: &str) -> Option<Slot> {
        self.rounds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(round)
            .cloned()
    }

    /// Replace a round's entries with a freshly computed generation.
    ///
    /// `compute` runs while the round's slot is held. If it fails, the previous
    /// generation stays in place untouched.
    pub fn replace_with<F>(&self, round: &str, compute: F) -> Result<RoundTally, TallyError>
    where
        F: FnOnce() -> Result<ComputedRound, TallyError>,
    {
        let slot = self.slot(round);
        let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());

        let computed = compute()?;
        let generation = current.as_ref().map_or(1, |t| t.generation + 1);
        let tally = RoundTally {
            round: round.to_string(),
            generation,
            computed_at: Utc::now(),
            complete: computed.complete,
            stale: false,
            entries: computed.entries,
        };
        *current = Some(tally.clone());
        Ok(tally)
    }

    pub fn get(&self, round: &str) -> Option<RoundTally> {
        self.existing_slot(round)
            .and_then(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    /// Flag a round's current generation as stale. Returns false if the round has no results.
    pub fn mark_stale(&self, round: &str) -> bool {
        let Some(slot) = self.existing_slot(round) else {
            return false;
        };
        let mut current = slot.lock().unwrap_or_else(|e| e.into_inner());
        match current.as_mut() {
            Some(tally) => {
                tally.stale = true;
                true
            }
            None => false,
        }
    }

    pub fn export(&self) -> BTreeMap<RoundId, RoundTally> {
        let slots: Vec<(RoundId, Slot)> = self
            .rounds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();
        slots
            .into_iter()
            .filter_map(|(id, slot)| {
                let tally = slot.lock().unwrap_or_else(|e| e.into_inner()).clone()?;
                Some((id, tally))
            })
            .collect()
    }

    pub fn restore(results: BTreeMap<RoundId, RoundTally>) -> Self {
        let store = Self::new();
        for (round, tally) in results {
            *store.slot(&round).lock().unwrap_or_else(|e| e.into_inner()) = Some(tally);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(contestant: &str, criterion: Option<&str>, score: i64) -> ComputedEntry {
        ComputedEntry {
            round: "r1".to_string(),
            contestant: contestant.to_string(),
            criterion: criterion.map(str::to_string),
            score: Fixed::from_int(score),
            rank: Fixed::from_int(1),
        }
    }

    fn computed(entries: Vec<ComputedEntry>) -> Result<ComputedRound, TallyError> {
        Ok(ComputedRound {
            entries,
            complete: true,
        })
    }

    #[test]
    fn test_generations_increment_and_replace() {
        let store = TallyStore::new();
        let first = store
            .replace_with("r1", || computed(vec![entry("c1", None, 10), entry("c2", None, 9)]))
            .unwrap();
        assert_eq!(first.generation, 1);

        let second = store
            .replace_with("r1", || computed(vec![entry("c1", None, 10)]))
            .unwrap();
        assert_eq!(second.generation, 2);
        assert_eq!(store.get("r1").unwrap().entries.len(), 1);
    }

    #[test]
    fn test_failed_compute_keeps_previous_generation() {
        let store = TallyStore::new();
        store
            .replace_with("r1", || computed(vec![entry("c1", None, 10)]))
            .unwrap();

        let result = store.replace_with("r1", || Err(TallyError::UnknownRound("r0".to_string())));
        assert!(result.is_err());

        let current = store.get("r1").unwrap();
        assert_eq!(current.generation, 1);
        assert_eq!(current.entries, vec![entry("c1", None, 10)]);
    }

    #[test]
    fn test_lookups() {
        let store = TallyStore::new();
        let tally = store
            .replace_with("r1", || {
                computed(vec![
                    entry("c1", Some("poise"), 30),
                    entry("c2", Some("poise"), 20),
                    entry("c1", None, 30),
                    entry("c2", None, 20),
                ])
            })
            .unwrap();

        assert_eq!(tally.totals().count(), 2);
        assert_eq!(tally.total_for("c2").unwrap().score, Fixed::from_int(20));
        assert_eq!(tally.criterion_entries("poise").count(), 2);
        assert!(tally.criterion_entry("wit", "c1").is_none());
        let poise = String::from("poise");
        let found = tally.criterion_entry(&poise, "c2").map(|e| e.score);
        assert_eq!(found, Some(Fixed::from_int(20)));
        assert_eq!(tally.total_map()["c1"], Fixed::from_int(30));
    }

    #[test]
    fn test_mark_stale_and_restore() {
        let store = TallyStore::new();
        assert!(!store.mark_stale("r1"));
        store
            .replace_with("r1", || computed(vec![entry("c1", None, 10)]))
            .unwrap();
        assert!(store.mark_stale("r1"));

        let restored = TallyStore::restore(store.export());
        assert!(restored.get("r1").unwrap().stale);
    }
}
