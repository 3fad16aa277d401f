pub mod aggregate;
pub mod error;
pub mod graph;
pub mod orw;
pub mod overall;
pub mod rank;
pub mod results;
pub mod tally;

pub use error::{TallyError, ValidationError};
pub use graph::{dependents_of, evaluation_plan, resolve_derived, rounds_in_order, validate_event, DerivedSources};
pub use orw::{OrwOutcome, OrwWeights};
pub use overall::{combine_rounds, winners, AbsentPolicy, Combine, OverallEntry, OverallPolicy, OverallTally, TieBreak, Winners};
pub use rank::{fractional_ranks, Ranked};
pub use results::{ComputedEntry, ComputedRound, RoundTally, TallyStore};
pub use tally::{compute_round_entries, is_fully_scored};
