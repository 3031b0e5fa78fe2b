pub mod cross_rule;
pub mod report;
pub mod source;

pub use cross_rule::{aggregate_cross_rule, count_new_pairs_by_year, summarize_cross_rule};
pub use report::AnalysisOptions;
pub use source::{NewPairsByRule, NewPairsDirectory, NewPairsSource};
