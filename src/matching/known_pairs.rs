// src/matching/known_pairs.rs
use std::collections::{BTreeMap, HashMap};

use crate::models::pairs::CandidatePair;
use crate::models::stats_models::DECLARED_INVERSE_STATUS;

/// Duplicate pairs already declared by the external authority, keyed by
/// (principal, duplicate) with a multiset of status labels.
///
/// Built once per invocation and only read afterwards, so it can be shared
/// across rule workers behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct KnownPairIndex {
    pairs: HashMap<String, HashMap<String, BTreeMap<String, usize>>>,
    entries: usize,
}

/// Result of looking a candidate up in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration<'a> {
    Declared(&'a BTreeMap<String, usize>),
    DeclaredInverse(usize),
    New,
}

impl KnownPairIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triples<I, S>(triples: I) -> Self
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        for (principal, duplicate, status) in triples {
            index.insert(principal.as_ref(), duplicate.as_ref(), status.as_ref());
        }
        index
    }

    /// Adds one declaration. Returns `false` (and stores nothing) when
    /// either id is blank.
    pub fn insert(&mut self, principal_id: &str, duplicate_id: &str, status: &str) -> bool {
        let principal_id = principal_id.trim();
        let duplicate_id = duplicate_id.trim();
        if principal_id.is_empty() || duplicate_id.is_empty() {
            return false;
        }
        *self
            .pairs
            .entry(principal_id.to_string())
            .or_default()
            .entry(duplicate_id.to_string())
            .or_default()
            .entry(status.trim().to_string())
            .or_insert(0) += 1;
        self.entries += 1;
        true
    }

    pub fn statuses(&self, principal_id: &str, duplicate_id: &str) -> Option<&BTreeMap<String, usize>> {
        self.pairs.get(principal_id)?.get(duplicate_id)
    }

    /// Number of accepted declarations.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of distinct directed pairs.
    pub fn pair_count(&self) -> usize {
        self.pairs.values().map(|d| d.len()).sum()
    }

    /// Checks (P, D) first, then the inverse (D, P).
    pub fn lookup(&self, principal_id: &str, duplicate_id: &str) -> Declaration<'_> {
        if let Some(statuses) = self.statuses(principal_id, duplicate_id) {
            if statuses.values().sum::<usize>() > 0 {
                return Declaration::Declared(statuses);
            }
        }
        if let Some(statuses) = self.statuses(duplicate_id, principal_id) {
            let total: usize = statuses.values().sum();
            if total > 0 {
                return Declaration::DeclaredInverse(total);
            }
        }
        Declaration::New
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnownPairFilterOutcome {
    pub new_pairs: Vec<CandidatePair>,
    pub already_declared: usize,
    pub status_distribution: BTreeMap<String, usize>,
}

/// Splits candidates into new pairs and already-declared ones, tallying the
/// statuses of the declared ones. Inverse hits are tallied under
/// `declared_inverse`.
pub fn filter_known_pairs(candidates: Vec<CandidatePair>, index: &KnownPairIndex) -> KnownPairFilterOutcome {
    let mut outcome = KnownPairFilterOutcome::default();
    for pair in candidates {
        match index.lookup(&pair.principal_id, &pair.duplicate_id) {
            Declaration::Declared(statuses) => {
                outcome.already_declared += 1;
                for (status, count) in statuses {
                    *outcome.status_distribution.entry(status.clone()).or_insert(0) += count;
                }
            }
            Declaration::DeclaredInverse(total) => {
                outcome.already_declared += 1;
                *outcome
                    .status_distribution
                    .entry(DECLARED_INVERSE_STATUS.to_string())
                    .or_insert(0) += total;
            }
            Declaration::New => outcome.new_pairs.push(pair),
        }
    }
    outcome
}
