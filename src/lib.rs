pub mod config;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod ledger;
pub mod output;
pub mod scoring;
pub mod storage;
pub mod telemetry;

pub use engine::{RecomputeOutcome, SubmitOutcome, Tabulator};
pub use fixed::Fixed;
