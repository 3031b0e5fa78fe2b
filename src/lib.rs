// src/lib.rs
pub mod analysis;
pub mod io;
pub mod matching;
pub mod models;
pub mod utils;

pub use models::contact::{ContactField, ContactRecord};
pub use models::pairs::{CandidatePair, OversizedGroup};
pub use models::stats_models::{CrossPairRecord, RuleSummary, RuleYearCount, YearlySummary};
