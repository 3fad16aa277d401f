use owo_colors::OwoColorize;
use std::io::IsTerminal;
use terminal_size::{terminal_size, Width};

use super::view::{CriterionTable, RoundView};
use crate::event::Event;
use crate::fixed::Fixed;
use crate::scoring::{OverallTally, Winners};

const NAME_WIDTH: usize = 24;
const NUMBER_WIDTH: usize = 9;
const RANK_WIDTH: usize = 5;

/// Check if stdout is a TTY (for auto-detecting color support)
pub fn should_use_colors() -> bool {
    std::io::stdout().is_terminal()
}

/// Get terminal width, defaulting to None for pipes (unlimited)
fn get_terminal_width() -> Option<usize> {
    terminal_size().map(|(Width(w), _)| w as usize)
}

/// Truncate a name to fit available width, accounting for Unicode
fn truncate_name(name: &str, max_width: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_width {
        name.to_string()
    } else if max_width > 3 {
        format!("{}...", chars[..max_width - 3].iter().collect::<String>())
    } else {
        chars[..max_width].iter().collect()
    }
}

/// Name column width: shrinks when the numeric columns would overflow the terminal
fn name_width(numeric_columns: usize) -> usize {
    let fixed = 4 + numeric_columns * (NUMBER_WIDTH + 1) + RANK_WIDTH + 1;
    match get_terminal_width() {
        Some(width) if width > fixed + 10 => NAME_WIDTH.min(width - fixed),
        Some(_) => 10,
        None => NAME_WIDTH,
    }
}

/// Scores render with two decimals at most, `-` when absent
pub fn format_score(score: Option<Fixed>) -> String {
    match score {
        Some(score) => score.round_dp(2).to_string(),
        None => "-".to_string(),
    }
}

/// Ranks keep their `.5` tie halves
pub fn format_rank(rank: Option<Fixed>) -> String {
    match rank {
        Some(rank) => rank.to_string(),
        None => "-".to_string(),
    }
}

fn pad_name(name: &str, width: usize) -> String {
    let name = truncate_name(name, width);
    let padding = width.saturating_sub(name.chars().count());
    format!("{}{}", name, " ".repeat(padding))
}

/// Format a round as a judge × contestant matrix, followed by the
/// per-criterion breakdown once every cell is filled.
pub fn format_round_view(view: &RoundView, use_colors: bool) -> String {
    let mut out = Vec::new();

    let mut header = format!(
        "{} [{}, {}] {}/{} cells",
        view.title, view.regime, view.status, view.filled_cells, view.total_cells
    );
    if let Some(generation) = view.generation {
        header.push_str(&format!(", generation {}", generation));
    }
    if view.stale {
        header.push_str(" (stale)");
    }
    out.push(if use_colors {
        header.bold().to_string()
    } else {
        header
    });

    if view.rows.is_empty() {
        out.push("No active contestants.".to_string());
        return out.join("\n");
    }

    let width = name_width(view.judges.len() + 1);
    let mut columns = format!("{:>3} {}", "#", pad_name("Contestant", width));
    for judge in &view.judges {
        columns.push_str(&format!(" {:>w$}", truncate_name(judge, NUMBER_WIDTH), w = NUMBER_WIDTH));
    }
    columns.push_str(&format!(" {:>w$} {:>r$}", "Total", "Rank", w = NUMBER_WIDTH, r = RANK_WIDTH));
    out.push(if use_colors {
        columns.dimmed().to_string()
    } else {
        columns
    });

    for (idx, row) in view.rows.iter().enumerate() {
        let mut line = format!("{:>2}. {}", idx + 1, pad_name(&row.name, width));
        for cell in &row.cells {
            line.push_str(&format!(" {:>w$}", format_score(*cell), w = NUMBER_WIDTH));
        }
        let total = format!("{:>w$}", format_score(row.total), w = NUMBER_WIDTH);
        let rank = format!("{:>r$}", format_rank(row.rank), r = RANK_WIDTH);
        if use_colors {
            line.push_str(&format!(" {} {}", total.bold(), rank.cyan()));
        } else {
            line.push_str(&format!(" {} {}", total, rank));
        }
        out.push(line);
    }

    for table in &view.criteria {
        out.push(String::new());
        out.push(format_criterion_table(table, &view.judges, use_colors));
    }

    out.join("\n")
}

fn format_criterion_table(table: &CriterionTable, judges: &[String], use_colors: bool) -> String {
    let mut title = table.label.clone();
    if let Some(weight) = table.weight {
        title.push_str(&format!(" ({}%)", weight));
    }
    if let Some(source) = &table.derived_from {
        title.push_str(&format!(" (from {})", source));
    }

    let derived = table.derived_from.is_some();
    let value_columns = if derived { 0 } else { judges.len() + 1 };
    let width = name_width(value_columns + 1);

    let mut lines = vec![if use_colors {
        title.bold().to_string()
    } else {
        title
    }];

    for row in &table.rows {
        let mut line = format!("    {}", pad_name(&row.name, width));
        if !derived {
            for value in &row.values {
                line.push_str(&format!(" {:>w$}", format_score(*value), w = NUMBER_WIDTH));
            }
            line.push_str(&format!(" {:>w$}", format_score(row.average), w = NUMBER_WIDTH));
        }
        line.push_str(&format!(
            " {:>w$} {:>r$}",
            format_score(row.score),
            format_rank(row.rank),
            w = NUMBER_WIDTH,
            r = RANK_WIDTH
        ));
        lines.push(line);
    }
    lines.join("\n")
}

/// Format overall results: rank, score, name, rounds counted
pub fn format_overall_table(event: &Event, overall: &OverallTally, use_colors: bool) -> String {
    if overall.entries.is_empty() {
        return "No finished rounds to combine.".to_string();
    }

    let width = name_width(1);
    let mut lines: Vec<String> = overall
        .entries
        .iter()
        .map(|entry| {
            let rank = format!("{:>r$}", format_rank(Some(entry.rank)), r = RANK_WIDTH);
            let score = format!("{:>w$}", format_score(Some(entry.score)), w = NUMBER_WIDTH);
            let name = pad_name(event.contestant_name(&entry.contestant), width);
            let rounds = format!("{}/{} rounds", entry.rounds_counted, overall.rounds.len());
            if use_colors {
                format!("{} {}  {}  {}", rank.cyan(), score.bold(), name, rounds.dimmed())
            } else {
                format!("{} {}  {}  {}", rank, score, name, rounds)
            }
        })
        .collect();

    if !overall.disqualified.is_empty() {
        let names: Vec<&str> = overall
            .disqualified
            .iter()
            .map(|c| event.contestant_name(c))
            .collect();
        lines.push(format!("Disqualified: {}", names.join(", ")));
    }
    lines.join("\n")
}

pub fn format_winners(event: &Event, winners: &Winners, use_colors: bool) -> String {
    if winners.entries.is_empty() {
        return "No winners yet.".to_string();
    }

    let mut lines: Vec<String> = winners
        .entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let place = format!("{:>2}.", idx + 1);
            let name = event.contestant_name(&entry.contestant);
            let detail = format!(
                "{} (rank {})",
                format_score(Some(entry.score)),
                format_rank(Some(entry.rank))
            );
            if use_colors {
                format!("{} {}  {}", place.dimmed(), name.bold(), detail)
            } else {
                format!("{} {}  {}", place, name, detail)
            }
        })
        .collect();

    if winners.tied_at_cutoff {
        lines.push("Note: a tie continues past the last place shown.".to_string());
    }
    lines.join("\n")
}

/// Round totals as tab-separated values for scripting
/// Columns: rank, total, contestant id, name (no headers, no colors)
pub fn format_round_tsv(view: &RoundView) -> String {
    view.rows
        .iter()
        .filter(|row| row.total.is_some())
        .map(|row| {
            format!(
                "{}\t{}\t{}\t{}",
                format_rank(row.rank),
                format_score(row.total),
                row.contestant,
                row.name
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Overall results as tab-separated values for scripting
/// Columns: rank, score, contestant id, name
pub fn format_overall_tsv(event: &Event, overall: &OverallTally) -> String {
    overall
        .entries
        .iter()
        .map(|entry| {
            format!(
                "{}\t{}\t{}\t{}",
                entry.rank,
                entry.score,
                entry.contestant,
                event.contestant_name(&entry.contestant)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
