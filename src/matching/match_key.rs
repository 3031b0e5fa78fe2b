// src/matching/match_key.rs
use crate::matching::normalize::normalize_text;
use crate::models::contact::{ContactField, ContactRecord};

/// Token some exports write for missing values.
const MISSING_TOKEN: &str = "NAN";

/// Single absence check for key building: blank values and the literal
/// `NAN` (any case) are treated as missing.
pub fn present_value(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(MISSING_TOKEN) {
        None
    } else {
        Some(trimmed)
    }
}

/// Builds the compact key for `record` over the rule's ordered `fields`.
///
/// Each present field is re-normalized and stripped of all whitespace, and
/// the tokens are concatenated without a delimiter, so `"AB" + "C"` and
/// `"A" + "BC"` produce the same key.
pub fn build_match_key(record: &ContactRecord, fields: &[ContactField]) -> String {
    let mut key = String::new();
    for field in fields {
        let Some(value) = present_value(record.get(*field)) else {
            continue;
        };
        let token: String = normalize_text(value)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        key.push_str(&token);
    }
    key
}
