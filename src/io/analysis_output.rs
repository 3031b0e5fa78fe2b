// src/io/analysis_output.rs - Cross-rule analysis tables
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::write_csv_atomic;
use crate::models::stats_models::{CrossPairRecord, RuleYearCount, YearlySummary};

pub const MILLESIME_FILE: &str = "millesime.csv";
pub const CROSS_ANALYSIS_FILE: &str = "cross_analysis.csv";

const MILLESIME_HEADER: [&str; 3] = ["Rule", "Year", "NewPairs"];
const CROSS_ANALYSIS_HEADER: [&str; 5] = ["Principal", "Doublon", "Year", "Occurrences", "Rules"];
// Column names kept compatible with the existing plotting scripts.
const CROSS_SUMMARY_HEADER: [&str; 5] = ["Year", "PairesUniques", "TotalOccurrences", "%Paires", "RedondanceMoy"];

#[derive(Debug, Serialize, Deserialize)]
struct CrossAnalysisRow {
    #[serde(rename = "Principal")]
    principal_id: String,
    #[serde(rename = "Doublon")]
    duplicate_id: String,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Occurrences")]
    occurrences: usize,
    /// JSON array of rule ids
    #[serde(rename = "Rules")]
    rules: String,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `cross_summary.csv` for the unfiltered table, `cross_summary_min<N>.csv`
/// when only pairs found by at least N rules are kept.
pub fn cross_summary_file_name(min_rules: usize) -> String {
    if min_rules <= 1 {
        "cross_summary.csv".to_string()
    } else {
        format!("cross_summary_min{}.csv", min_rules)
    }
}

pub fn write_millesime(analysis_dir: &Path, counts: &[RuleYearCount]) -> Result<PathBuf> {
    let path = analysis_dir.join(MILLESIME_FILE);
    write_csv_atomic(&path, &MILLESIME_HEADER, |writer| {
        for count in counts {
            writer.serialize(count)?;
        }
        Ok(())
    })?;
    info!("📅 Yearly counts for {} rule/year cells written to {}", counts.len(), path.display());
    Ok(path)
}

pub fn write_cross_analysis(analysis_dir: &Path, records: &[CrossPairRecord]) -> Result<PathBuf> {
    let path = analysis_dir.join(CROSS_ANALYSIS_FILE);
    write_csv_atomic(&path, &CROSS_ANALYSIS_HEADER, |writer| {
        for record in records {
            writer.serialize(CrossAnalysisRow {
                principal_id: record.principal_id.clone(),
                duplicate_id: record.duplicate_id.clone(),
                year: record.year,
                occurrences: record.occurrences,
                rules: serde_json::to_string(&record.rules).context("Failed to encode rule list")?,
            })?;
        }
        Ok(())
    })?;
    info!("🔀 {} consolidated pairs written to {}", records.len(), path.display());
    Ok(path)
}

pub fn read_cross_analysis(analysis_dir: &Path) -> Result<Vec<CrossPairRecord>> {
    let path = analysis_dir.join(CROSS_ANALYSIS_FILE);
    let file = File::open(&path).with_context(|| {
        format!("{} not found; run the cross-rule aggregation first", path.display())
    })?;
    let mut reader = ReaderBuilder::new().from_reader(file);

    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<CrossAnalysisRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))?;
        let rules: Vec<String> = serde_json::from_str(&row.rules)
            .with_context(|| format!("Invalid Rules value on row {} in {}", line + 2, path.display()))?;
        records.push(CrossPairRecord {
            principal_id: row.principal_id,
            duplicate_id: row.duplicate_id,
            year: row.year,
            occurrences: row.occurrences,
            rules,
        });
    }
    Ok(records)
}

/// Percentages and averages are rounded to two decimals here only.
pub fn write_cross_summary(analysis_dir: &Path, summary: &[YearlySummary], min_rules: usize) -> Result<PathBuf> {
    let path = analysis_dir.join(cross_summary_file_name(min_rules));
    write_csv_atomic(&path, &CROSS_SUMMARY_HEADER, |writer| {
        for row in summary {
            writer.write_record(&[
                row.year.to_string(),
                row.unique_pairs.to_string(),
                row.total_occurrences.to_string(),
                round2(row.percent_of_total).to_string(),
                round2(row.avg_redundancy).to_string(),
            ])?;
        }
        Ok(())
    })?;
    for row in summary {
        info!(
            "   {} │ {} unique pairs │ {} occurrences │ {:.2}% │ redundancy {:.2}",
            row.year, row.unique_pairs, row.total_occurrences, row.percent_of_total, row.avg_redundancy
        );
    }
    info!("📊 Yearly summary written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record(principal: &str, duplicate: &str, year: i32, rules: &[&str]) -> CrossPairRecord {
        CrossPairRecord {
            principal_id: principal.to_string(),
            duplicate_id: duplicate.to_string(),
            year,
            occurrences: rules.len(),
            rules: rules.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_cross_analysis_is_read_back() {
        let dir = tempdir().unwrap();
        let records = vec![record("A", "B", 2021, &["A0", "C1"]), record("A", "C", 2023, &["B2"])];
        let path = write_cross_analysis(dir.path(), &records).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert!(content.starts_with("Principal,Doublon,Year,Occurrences,Rules\n"));
        assert!(content.contains(r#"A,B,2021,2,"[""A0"",""C1""]""#));

        assert_eq!(read_cross_analysis(dir.path()).unwrap(), records);
    }

    #[test]
    fn test_missing_cross_analysis_is_reported() {
        let dir = tempdir().unwrap();
        let err = read_cross_analysis(dir.path()).unwrap_err();
        assert!(err.to_string().contains("run the cross-rule aggregation first"));
    }

    #[test]
    fn test_cross_summary_rounding_and_naming() {
        let dir = tempdir().unwrap();
        let summary = vec![YearlySummary {
            year: 2022,
            unique_pairs: 3,
            total_occurrences: 5,
            percent_of_total: 100.0 / 3.0,
            avg_redundancy: 5.0 / 3.0,
        }];
        let path = write_cross_summary(dir.path(), &summary, 2).unwrap();
        assert_eq!(path, dir.path().join("cross_summary_min2.csv"));
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "Year,PairesUniques,TotalOccurrences,%Paires,RedondanceMoy\n2022,3,5,33.33,1.67\n"
        );
        assert_eq!(cross_summary_file_name(1), "cross_summary.csv");
    }

    #[test]
    fn test_millesime_columns() {
        let dir = tempdir().unwrap();
        let counts = vec![RuleYearCount { rule: "A0".to_string(), year: 2021, new_pairs: 7 }];
        let path = write_millesime(dir.path(), &counts).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "Rule,Year,NewPairs\nA0,2021,7\n");
    }
}
