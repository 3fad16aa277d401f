use anyhow::{Context, Result};
use atomic_write_file::AtomicWriteFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;

use crate::event::{Event, RoundId};
use crate::ledger::LedgerSnapshot;
use crate::scoring::{OverallTally, RoundTally};

pub const STATE_VERSION: u32 = 1;

/// Everything needed to resume tabulating an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub version: u32,
    pub event: Event,
    #[serde(default)]
    pub ledger: LedgerSnapshot,
    #[serde(default)]
    pub results: BTreeMap<RoundId, RoundTally>,
    #[serde(default)]
    pub overall: Option<OverallTally>,
}

/// Load engine state from a JSON file
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist (no event has been initialised)
/// - The file cannot be read or parsed
/// - The state was written by an unsupported version
pub fn load_state(path: &Path) -> Result<EngineState> {
    if !path.exists() {
        anyhow::bail!(
            "No tally state at {}. Run `tally init <event.yaml>` first",
            path.display()
        );
    }

    let file = File::open(path)
        .with_context(|| format!("Failed to open tally state at {}", path.display()))?;

    let state: EngineState = serde_json::from_reader(file)
        .with_context(|| format!("Failed to load tally state from {}", path.display()))?;

    if state.version != STATE_VERSION {
        anyhow::bail!("Unsupported tally state version: {}", state.version);
    }

    Ok(state)
}

/// Save engine state to a JSON file atomically
///
/// Uses atomic-write-file so an interrupted save never leaves a corrupt file.
/// Creates the parent directory if it doesn't exist.
pub fn save_state(path: &Path, state: &EngineState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory at {}", parent.display()))?;
    }

    let mut file = AtomicWriteFile::open(path)
        .with_context(|| format!("Failed to open atomic write file at {}", path.display()))?;

    serde_json::to_writer_pretty(&mut file, state).context("Failed to serialize tally state")?;

    file.commit().context("Failed to save tally state")?;

    Ok(())
}
