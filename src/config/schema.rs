use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::scoring::TieBreak;

/// Example YAML:
/// ```yaml
/// state_path: /srv/pageant/state.json
/// log:
///   level: debug
///   json: true
/// winners:
///   count: 5
///   tie_break: contestant_id
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Where the engine state lives (defaults to ~/.config/score-tally/state.json)
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub winners: WinnersConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// trace, debug, info, warn or error (default: warn)
    #[serde(default)]
    pub level: Option<String>,

    /// Emit JSON lines instead of human-readable logs
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WinnersConfig {
    #[serde(default = "default_winner_count")]
    pub count: usize,

    #[serde(default)]
    pub tie_break: TieBreak,
}

fn default_winner_count() -> usize {
    3
}

impl Default for WinnersConfig {
    fn default() -> Self {
        Self {
            count: default_winner_count(),
            tie_break: TieBreak::default(),
        }
    }
}
