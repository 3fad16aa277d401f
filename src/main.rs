use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

use score_tally::config::{self, Config};
use score_tally::event::load_event;
use score_tally::ledger::load_card;
use score_tally::output::{self, should_use_colors};
use score_tally::scoring::{TallyError, TieBreak};
use score_tally::storage::{load_state, save_state};
use score_tally::telemetry::init_tracing;
use score_tally::{RecomputeOutcome, Tabulator};

const EXIT_SUCCESS: i32 = 0;
const EXIT_REJECTED: i32 = 1;
const EXIT_NOT_READY: i32 = 2;
const EXIT_CONFIG: i32 = 4;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start tabulating an event from its YAML definition
    Init {
        /// Path to the event definition
        event: PathBuf,
        /// Replace existing state
        #[arg(long)]
        force: bool,
    },
    /// Open a round for scoring
    Open {
        round: String,
        /// Active contestants, comma separated (keeps the current set if omitted)
        #[arg(long, value_delimiter = ',')]
        active: Option<Vec<String>>,
    },
    /// Submit a judge's score card (YAML)
    Submit {
        card: PathBuf,
    },
    /// Recompute a round's tally
    Compute {
        round: String,
    },
    /// Close a round; its tally becomes authoritative
    Close {
        round: String,
    },
    /// Reopen a finished round for corrections
    Reopen {
        round: String,
    },
    /// Show a round's score matrix and breakdown
    Show {
        round: String,
        /// Tab-separated totals for scripting
        #[arg(long)]
        tsv: bool,
    },
    /// Combine finished rounds into overall results
    Overall {
        #[arg(long)]
        tsv: bool,
    },
    /// List the top contestants
    Winners {
        /// Number of places (defaults to winners.count from config)
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Order among tied contestants
        #[arg(long, value_enum)]
        tie_break: Option<TieBreak>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Tally judged competitions with weighted criteria and tie-aware ranking", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (defaults to ~/.config/score-tally/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to state file (defaults to state_path from config)
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load_config(cli.config.clone()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(errors) = config::validate_config(&config) {
        eprintln!("Config errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        std::process::exit(EXIT_CONFIG);
    }

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config::log_level(&config)
    };
    init_tracing(config.log.json, level);

    let Some(state_path) = cli.state.clone().or_else(|| config::state_path(&config)) else {
        eprintln!("Could not determine home directory; pass --state PATH");
        std::process::exit(EXIT_CONFIG);
    };
    debug!(state = %state_path.display(), "using state file");

    match run(cli.command, &state_path, &config) {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            report(&e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn run(command: Commands, state_path: &Path, config: &Config) -> Result<()> {
    let use_colors = should_use_colors();

    match command {
        Commands::Init { event, force } => {
            if state_path.exists() && !force {
                anyhow::bail!(
                    "State already exists at {}. Use --force to start over",
                    state_path.display()
                );
            }
            let event = load_event(&event)?;
            let tabulator = Tabulator::new(event)?;
            save_state(state_path, &tabulator.export_state())?;
            let event = tabulator.event();
            println!(
                "Initialised {} ({} rounds, {} contestants, {} judges)",
                event.display_title(),
                event.rounds.len(),
                event.contestants.len(),
                event.judges.len()
            );
        }
        Commands::Open { round, active } => {
            let tabulator = open_state(state_path)?;
            tabulator.open_round(&round, active)?;
            save_state(state_path, &tabulator.export_state())?;
            println!("Round {} is open for scoring", round);
        }
        Commands::Submit { card } => {
            let tabulator = open_state(state_path)?;
            let card = load_card(&card)?;
            let (round, judge) = (card.round.clone(), card.judge.clone());
            let outcome = tabulator.submit_card(card)?;
            save_state(state_path, &tabulator.export_state())?;
            println!("Accepted {} rows from {} for round {}", outcome.rows, judge, round);
            if let Some(recomputed) = outcome.recomputed {
                print_recompute(&recomputed);
            }
        }
        Commands::Compute { round } => {
            let tabulator = open_state(state_path)?;
            let outcome = tabulator.compute_round_tally(&round)?;
            save_state(state_path, &tabulator.export_state())?;
            print_recompute(&outcome);
        }
        Commands::Close { round } => {
            let tabulator = open_state(state_path)?;
            let outcome = tabulator.close_round(&round)?;
            save_state(state_path, &tabulator.export_state())?;
            println!("Round {} closed", round);
            print_recompute(&outcome);
        }
        Commands::Reopen { round } => {
            let tabulator = open_state(state_path)?;
            tabulator.reopen_round(&round)?;
            save_state(state_path, &tabulator.export_state())?;
            println!("Round {} reopened; close it again to refresh dependent rounds", round);
        }
        Commands::Show { round, tsv } => {
            let tabulator = open_state(state_path)?;
            let view = tabulator.round_view(&round)?;
            if tsv {
                println!("{}", output::format_round_tsv(&view));
            } else {
                println!("{}", output::format_round_view(&view, use_colors));
                if tabulator.is_touched(&round) {
                    eprintln!("Scores changed since the last tally; run `tally compute {}`", round);
                }
            }
        }
        Commands::Overall { tsv } => {
            let tabulator = open_state(state_path)?;
            let overall = tabulator.compute_overall()?;
            save_state(state_path, &tabulator.export_state())?;
            let event = tabulator.event();
            if tsv {
                println!("{}", output::format_overall_tsv(&event, &overall));
            } else {
                println!("{}", output::format_overall_table(&event, &overall, use_colors));
            }
        }
        Commands::Winners { count, tie_break } => {
            let tabulator = open_state(state_path)?;
            let count = count.unwrap_or(config.winners.count);
            let tie_break = tie_break.unwrap_or(config.winners.tie_break);
            let winners = tabulator.winners(count, tie_break)?;
            println!("{}", output::format_winners(&tabulator.event(), &winners, use_colors));
        }
    }

    Ok(())
}

fn open_state(path: &Path) -> Result<Tabulator> {
    let state = load_state(path)?;
    Tabulator::from_state(state)
        .with_context(|| format!("Invalid event definition in {}", path.display()))
}

fn print_recompute(outcome: &RecomputeOutcome) {
    let tally = &outcome.tally;
    println!(
        "Round {} tallied (generation {}, {})",
        tally.round,
        tally.generation,
        if tally.complete { "complete" } else { "partial" }
    );
    if !outcome.stale_dependents.is_empty() {
        println!(
            "Stale until recomputed: {}",
            outcome.stale_dependents.join(", ")
        );
    }
}

fn report(error: &anyhow::Error) {
    match error.downcast_ref::<TallyError>() {
        Some(TallyError::Rejected {
            round,
            judge,
            reasons,
        }) => {
            eprintln!("Submission rejected for judge '{}' in round '{}':", judge, round);
            for reason in reasons {
                eprintln!("  - {}", reason);
            }
        }
        _ => eprintln!("Error: {:#}", error),
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<TallyError>() {
        Some(e) if e.is_not_ready() => EXIT_NOT_READY,
        Some(TallyError::InvalidEvent(_)) => EXIT_CONFIG,
        Some(_) => EXIT_REJECTED,
        None => EXIT_CONFIG,
    }
}
