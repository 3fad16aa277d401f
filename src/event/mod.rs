mod types;

pub use types::{
    ContestantId, Contestant, Criterion, CriterionId, Event, EventId, EventKind, Judge, JudgeId,
    Regime, Round, RoundId, RoundStatus,
};

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse an event definition from YAML text
pub fn parse_event(content: &str) -> Result<Event> {
    serde_saphyr::from_str(content).context("Failed to parse event definition: invalid YAML")
}

/// Load an event definition from a YAML file
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist or cannot be read
/// - The YAML cannot be parsed into an event definition
pub fn load_event(path: &Path) -> Result<Event> {
    if !path.exists() {
        anyhow::bail!("Event definition not found at {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read event definition at {}", path.display()))?;

    parse_event(&content).with_context(|| format!("in {}", path.display()))
}
