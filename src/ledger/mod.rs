pub mod store;
pub mod types;
pub mod validation;

pub use store::ScoreLedger;
pub use types::{LedgerSnapshot, RawScores, RoundSheet, ScoreCard, ScoreRow, Submission};
pub use validation::validate_card;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Load a judge's score card from a YAML file
pub fn load_card(path: &Path) -> Result<ScoreCard> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read score card at {}", path.display()))?;

    serde_saphyr::from_str(&content)
        .with_context(|| format!("Failed to parse score card: invalid YAML in {}", path.display()))
}
