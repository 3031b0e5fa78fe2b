// src/io/rule_output.rs - Per-rule CSV outputs
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::write_csv_atomic;
use crate::matching::eligibility::keyed_records;
use crate::matching::rule_runner::RuleRunOutput;
use crate::matching::rules::MatchRule;
use crate::models::contact::{ContactField, ContactRecord};
use crate::models::stats_models::RuleSummary;
use crate::utils::dates::date_token;

pub const NEW_PAIRS_SUFFIX: &str = "new_pairs.csv";

const NEW_PAIRS_HEADER: [&str; 7] = [
    "Principal",
    "Doublon",
    "Rule",
    "MatchKey",
    "GroupSize",
    "PrincipalCreatedDate",
    "DoublonCreatedDate",
];
const SUMMARY_HEADER: [&str; 8] = [
    "rule",
    "name",
    "contacts",
    "pairs",
    "already_declared",
    "new_pairs",
    "status_distribution",
    "groups_too_large",
];
const GROUPS_TOO_LARGE_HEADER: [&str; 2] = ["match_key", "group_size"];

#[derive(Serialize)]
struct SummaryRow<'a> {
    rule: &'a str,
    name: &'a str,
    contacts: usize,
    pairs: usize,
    already_declared: usize,
    new_pairs: usize,
    status_distribution: String,
    groups_too_large: usize,
}

impl<'a> SummaryRow<'a> {
    fn from_summary(summary: &'a RuleSummary) -> Result<Self> {
        Ok(Self {
            rule: &summary.rule,
            name: &summary.name,
            contacts: summary.contacts,
            pairs: summary.pairs,
            already_declared: summary.already_declared,
            new_pairs: summary.new_pairs,
            status_distribution: serde_json::to_string(&summary.status_distribution)
                .context("Failed to encode status distribution")?,
            groups_too_large: summary.groups_too_large,
        })
    }
}

/// Paths written for one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOutputFiles {
    pub new_pairs: PathBuf,
    pub summary: PathBuf,
    pub groups_too_large: Option<PathBuf>,
}

/// Writes `<RULE>_<YYYY_MM_DD>_<kind>.csv` files into one directory.
/// Re-running on the same day overwrites the previous files.
#[derive(Debug, Clone)]
pub struct RuleOutputWriter {
    out_dir: PathBuf,
    date_token: String,
}

impl RuleOutputWriter {
    pub fn new(out_dir: impl Into<PathBuf>, date: NaiveDate) -> Self {
        Self {
            out_dir: out_dir.into(),
            date_token: date_token(date),
        }
    }

    pub fn for_today(out_dir: impl Into<PathBuf>) -> Self {
        Self::new(out_dir, Local::now().date_naive())
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn path_for(&self, rule_id: &str, kind: &str) -> PathBuf {
        self.out_dir.join(format!("{}_{}_{}", rule_id, self.date_token, kind))
    }

    /// Writes the new pairs (header only when empty), the one-row summary
    /// and, when any exist, the oversized groups.
    pub fn write(&self, output: &RuleRunOutput) -> Result<RuleOutputFiles> {
        let rule_id = &output.rule_id;
        let mut files = RuleOutputFiles {
            new_pairs: self.path_for(rule_id, NEW_PAIRS_SUFFIX),
            summary: self.path_for(rule_id, "summary.csv"),
            ..Default::default()
        };

        write_csv_atomic(&files.new_pairs, &NEW_PAIRS_HEADER, |writer| {
            for pair in &output.new_pairs {
                writer.serialize(pair)?;
            }
            Ok(())
        })?;

        let summary_row = SummaryRow::from_summary(&output.summary)?;
        write_csv_atomic(&files.summary, &SUMMARY_HEADER, |writer| {
            writer.serialize(&summary_row)?;
            Ok(())
        })?;

        if !output.oversized_groups.is_empty() {
            let path = self.path_for(rule_id, "groups_too_large.csv");
            write_csv_atomic(&path, &GROUPS_TOO_LARGE_HEADER, |writer| {
                for group in &output.oversized_groups {
                    writer.serialize(group)?;
                }
                Ok(())
            })?;
            files.groups_too_large = Some(path);
        }

        info!(
            "💾 [{}] {} new pairs written to {}",
            rule_id,
            output.new_pairs.len(),
            files.new_pairs.display()
        );
        Ok(files)
    }

    /// Writes the records eligible for `rule` with their match key.
    pub fn write_contacts(&self, rule: &MatchRule, records: &[ContactRecord]) -> Result<PathBuf> {
        let path = self.path_for(&rule.id, "contacts.csv");
        let mut header = vec!["Id", "CreatedDate"];
        header.extend(ContactField::ALL.iter().map(|f| f.code()));
        header.push("match_key");

        let mut written = 0usize;
        write_csv_atomic(&path, &header, |writer| {
            for keyed in keyed_records(records, &rule.fields) {
                let record = keyed.record;
                let mut row = vec![record.id.as_str(), record.created_date_iso.as_str()];
                row.extend(ContactField::ALL.iter().map(|f| record.get(*f)));
                row.push(keyed.match_key.as_str());
                writer.write_record(&row)?;
                written += 1;
            }
            Ok(())
        })?;
        debug!("[{}] {} eligible contacts written to {}", rule.id, written, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::grouping::GroupingOptions;
    use crate::matching::known_pairs::KnownPairIndex;
    use crate::matching::rule_runner::run_rule;
    use crate::models::contact::ContactField::*;
    use std::fs;
    use tempfile::tempdir;

    fn rule() -> MatchRule {
        MatchRule::new("C9", "Household email", &[LastName, Email])
    }

    fn records() -> Vec<ContactRecord> {
        vec![
            ContactRecord::new("b")
                .with_field(LastName, "DURAND")
                .with_field(Email, "d@x.fr")
                .with_created_date("2022-02-02"),
            ContactRecord::new("a")
                .with_field(LastName, "DURAND")
                .with_field(Email, "d@x.fr")
                .with_created_date("2020-01-01"),
            ContactRecord::new("c").with_field(LastName, "DURAND"),
        ]
    }

    fn writer(dir: &Path) -> RuleOutputWriter {
        RuleOutputWriter::new(dir, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap())
    }

    #[test]
    fn test_writes_new_pairs_and_summary() {
        let dir = tempdir().unwrap();
        let known = KnownPairIndex::from_triples(vec![("x", "y", "Traité")]);
        let output = run_rule(&rule(), &records(), &known, &GroupingOptions::default()).unwrap();

        let files = writer(dir.path()).write(&output).unwrap();
        assert_eq!(files.new_pairs, dir.path().join("C9_2024_06_03_new_pairs.csv"));
        assert!(files.groups_too_large.is_none());

        let pairs = fs::read_to_string(&files.new_pairs).unwrap();
        assert_eq!(
            pairs,
            "Principal,Doublon,Rule,MatchKey,GroupSize,PrincipalCreatedDate,DoublonCreatedDate\n\
             a,b,C9,DURANDDXFR,2,2020-01-01T00:00:00+00:00,2022-02-02T00:00:00+00:00\n"
        );

        let summary = fs::read_to_string(&files.summary).unwrap();
        assert_eq!(
            summary,
            "rule,name,contacts,pairs,already_declared,new_pairs,status_distribution,groups_too_large\n\
             C9,Household email,2,1,0,1,{},0\n"
        );
    }

    #[test]
    fn test_empty_rule_writes_header_only_and_oversized_file() {
        let dir = tempdir().unwrap();
        let output = run_rule(
            &rule(),
            &records(),
            &KnownPairIndex::new(),
            &GroupingOptions::with_threshold(1),
        )
        .unwrap();

        let files = writer(dir.path()).write(&output).unwrap();
        assert_eq!(
            fs::read_to_string(&files.new_pairs).unwrap(),
            "Principal,Doublon,Rule,MatchKey,GroupSize,PrincipalCreatedDate,DoublonCreatedDate\n"
        );
        let oversized = files.groups_too_large.unwrap();
        assert_eq!(
            fs::read_to_string(oversized).unwrap(),
            "match_key,group_size\nDURANDDXFR,2\n"
        );
    }

    #[test]
    fn test_same_day_rerun_replaces_files() {
        let dir = tempdir().unwrap();
        let writer = writer(dir.path());
        let mut more = records();
        more.push(
            ContactRecord::new("d")
                .with_field(LastName, "DURAND")
                .with_field(Email, "d@x.fr")
                .with_created_date("2023-03-03"),
        );
        let first = run_rule(&rule(), &more, &KnownPairIndex::new(), &GroupingOptions::default()).unwrap();
        assert_eq!(first.new_pairs.len(), 2);
        writer.write(&first).unwrap();

        let second = run_rule(&rule(), &records(), &KnownPairIndex::new(), &GroupingOptions::default()).unwrap();
        let files = writer.write(&second).unwrap();

        let pairs = fs::read_to_string(&files.new_pairs).unwrap();
        assert_eq!(pairs.lines().count(), 2);
        assert!(pairs.ends_with("a,b,C9,DURANDDXFR,2,2020-01-01T00:00:00+00:00,2022-02-02T00:00:00+00:00\n"));

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["C9_2024_06_03_new_pairs.csv", "C9_2024_06_03_summary.csv"]);
    }

    #[test]
    fn test_status_distribution_is_json() {
        let dir = tempdir().unwrap();
        let known = KnownPairIndex::from_triples(vec![("a", "b", "Traité"), ("a", "b", "Open")]);
        let output = run_rule(&rule(), &records(), &known, &GroupingOptions::default()).unwrap();
        let files = writer(dir.path()).write(&output).unwrap();
        let summary = fs::read_to_string(&files.summary).unwrap();
        assert!(summary.contains(r#""{""Open"":1,""Traité"":1}""#));
    }

    #[test]
    fn test_contacts_file_lists_eligible_records() {
        let dir = tempdir().unwrap();
        let path = writer(dir.path()).write_contacts(&rule(), &records()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Id,CreatedDate,SAL,FN,LN"));
        assert!(lines[0].ends_with(",match_key"));
        assert!(lines[1].starts_with("b,2022-02-02T00:00:00+00:00"));
        assert!(lines[1].ends_with(",DURANDDXFR"));
    }
}
