// src/analysis/cross_rule.rs - Inter-rule redundancy of new pairs
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::pairs::CandidatePair;
use crate::models::stats_models::{CrossPairRecord, RuleYearCount, YearlySummary};
use crate::utils::dates::bucket_year;

pub const MIN_YEAR_DEFAULT: i32 = 2021;

/// Consolidates the new pairs of every rule into one row per
/// (principal, duplicate, year). `occurrences` counts contributing rows,
/// `rules` lists the distinct contributing rule ids in order.
///
/// The year comes from the duplicate's creation date, floored to
/// `min_year`; rows without a usable date are dropped.
pub fn aggregate_cross_rule(
    new_pairs_by_rule: &BTreeMap<String, Vec<CandidatePair>>,
    min_year: i32,
) -> Vec<CrossPairRecord> {
    let mut grouped: BTreeMap<(&str, &str, i32), (usize, BTreeSet<&str>)> = BTreeMap::new();
    let mut dropped = 0usize;

    for (rule_id, pairs) in new_pairs_by_rule {
        for pair in pairs {
            let Some(year) = bucket_year(&pair.duplicate_created_date, min_year) else {
                dropped += 1;
                continue;
            };
            let entry = grouped
                .entry((pair.principal_id.as_str(), pair.duplicate_id.as_str(), year))
                .or_default();
            entry.0 += 1;
            entry.1.insert(rule_id.as_str());
        }
    }
    if dropped > 0 {
        debug!("Cross-rule aggregation dropped {} rows without a usable duplicate date", dropped);
    }

    let records: Vec<CrossPairRecord> = grouped
        .into_iter()
        .map(|((principal, duplicate, year), (occurrences, rules))| CrossPairRecord {
            principal_id: principal.to_string(),
            duplicate_id: duplicate.to_string(),
            year,
            occurrences,
            rules: rules.into_iter().map(str::to_string).collect(),
        })
        .collect();
    info!(
        "🔀 Cross-rule aggregation: {} rules → {} unique consolidated pairs",
        new_pairs_by_rule.len(),
        records.len()
    );
    records
}

/// Per-year totals over the consolidated table, keeping only rows found
/// by at least `min_rules` distinct rules.
pub fn summarize_cross_rule(records: &[CrossPairRecord], min_rules: usize) -> Vec<YearlySummary> {
    let mut by_year: BTreeMap<i32, (usize, usize)> = BTreeMap::new();
    for record in records.iter().filter(|r| r.rules.len() >= min_rules) {
        let entry = by_year.entry(record.year).or_default();
        entry.0 += 1;
        entry.1 += record.occurrences;
    }

    let grand_total: usize = by_year.values().map(|(unique, _)| unique).sum();
    by_year
        .into_iter()
        .map(|(year, (unique_pairs, total_occurrences))| YearlySummary {
            year,
            unique_pairs,
            total_occurrences,
            percent_of_total: if grand_total > 0 {
                unique_pairs as f64 / grand_total as f64 * 100.0
            } else {
                0.0
            },
            avg_redundancy: total_occurrences as f64 / unique_pairs as f64,
        })
        .collect()
}

/// New pairs per rule and creation year, same year rules as the
/// cross-rule aggregation.
pub fn count_new_pairs_by_year(
    new_pairs_by_rule: &BTreeMap<String, Vec<CandidatePair>>,
    min_year: i32,
) -> Vec<RuleYearCount> {
    let mut counts: BTreeMap<(&str, i32), usize> = BTreeMap::new();
    for (rule_id, pairs) in new_pairs_by_rule {
        for year in pairs
            .iter()
            .filter_map(|p| bucket_year(&p.duplicate_created_date, min_year))
        {
            *counts.entry((rule_id.as_str(), year)).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .map(|((rule, year), new_pairs)| RuleYearCount {
            rule: rule.to_string(),
            year,
            new_pairs,
        })
        .collect()
}
