// src/models/pairs.rs
use serde::{Deserialize, Serialize};

/// A principal ↔ duplicate pairing produced by one rule's grouping step.
///
/// Field names on the wire follow the per-rule `new_pairs` files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePair {
    #[serde(rename = "Principal")]
    pub principal_id: String,
    #[serde(rename = "Doublon")]
    pub duplicate_id: String,
    #[serde(rename = "Rule")]
    pub rule_id: String,
    #[serde(rename = "MatchKey")]
    pub match_key: String,
    #[serde(rename = "GroupSize")]
    pub group_size: usize,
    #[serde(rename = "PrincipalCreatedDate", default)]
    pub principal_created_date: String,
    #[serde(rename = "DoublonCreatedDate", default)]
    pub duplicate_created_date: String,
}

/// A match group skipped because it exceeded the pairing threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OversizedGroup {
    pub match_key: String,
    pub group_size: usize,
}
