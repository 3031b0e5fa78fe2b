pub mod eligibility;
pub mod grouping;
pub mod known_pairs;
pub mod manager;
pub mod match_key;
pub mod normalize;
pub mod rule_runner;
pub mod rules;

pub use grouping::{GroupingOptions, GroupingStrategy, GROUP_THRESHOLD_DEFAULT};
pub use known_pairs::KnownPairIndex;
pub use manager::{run_rules, RuleBatchInputs, RuleBatchReport};
pub use rule_runner::{run_rule, RuleRunOutput};
pub use rules::{MatchRule, RuleRegistry};
