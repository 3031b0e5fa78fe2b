// src/models/stats_models.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status bucket used when a candidate was declared in the opposite direction.
pub const DECLARED_INVERSE_STATUS: &str = "declared_inverse";

/// Per-rule counts reported after known-pair reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub rule: String,
    pub name: String,
    pub contacts: usize,
    pub pairs: usize,
    pub already_declared: usize,
    pub new_pairs: usize,
    pub status_distribution: BTreeMap<String, usize>,
    pub groups_too_large: usize,
}

impl RuleSummary {
    pub fn empty(rule: &str, name: &str) -> Self {
        Self {
            rule: rule.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// One consolidated (principal, duplicate, year) pair across all rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossPairRecord {
    pub principal_id: String,
    pub duplicate_id: String,
    pub year: i32,
    pub occurrences: usize,
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearlySummary {
    pub year: i32,
    pub unique_pairs: usize,
    pub total_occurrences: usize,
    pub percent_of_total: f64,
    pub avg_redundancy: f64,
}

/// New pairs found by one rule for one creation year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleYearCount {
    #[serde(rename = "Rule")]
    pub rule: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "NewPairs")]
    pub new_pairs: usize,
}
