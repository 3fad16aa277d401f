pub mod formatter;
pub mod view;

pub use formatter::{
    format_overall_table, format_overall_tsv, format_rank, format_round_tsv, format_round_view,
    format_score, format_winners, should_use_colors,
};
pub use view::{build_round_view, CriterionRow, CriterionTable, MatrixRow, RoundView};
