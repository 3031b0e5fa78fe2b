// src/matching/normalize.rs
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::contact::{ContactField, ContactRecord};

static NON_KEY_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9A-Z\s]").expect("valid regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Canonical form for names, streets and cities: accents stripped,
/// uppercased, anything outside `[A-Z0-9]` and whitespace turned into a
/// space, whitespace collapsed.
pub fn normalize_text(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let stripped: String = trimmed.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let upper = stripped.to_uppercase();
    let cleaned = NON_KEY_CHARS.replace_all(&upper, " ");
    WHITESPACE_RUN.replace_all(&cleaned, " ").trim().to_string()
}

/// Emails are only trimmed; case is kept.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_string()
}

/// Digits only, no length validation.
pub fn normalize_phone(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn normalize_postal_code(value: &str) -> String {
    value.trim().to_string()
}

pub fn normalize_salutation(value: &str) -> String {
    value.trim().to_string()
}

/// Applies the canonicalization matching `field`.
pub fn normalize_field(field: ContactField, value: &str) -> String {
    match field {
        ContactField::Salutation => normalize_salutation(value),
        ContactField::PostalCode => normalize_postal_code(value),
        ContactField::Email => normalize_email(value),
        ContactField::MobilePhone | ContactField::HomePhone => normalize_phone(value),
        ContactField::FirstName
        | ContactField::LastName
        | ContactField::Street1
        | ContactField::Street2
        | ContactField::Street3
        | ContactField::Street4
        | ContactField::City => normalize_text(value),
    }
}

/// Normalizes every field of a record in place. Id and dates are untouched.
pub fn normalize_record(record: &mut ContactRecord) {
    for field in ContactField::ALL {
        let normalized = normalize_field(field, record.get(field));
        *record.field_mut(field) = normalized;
    }
}
