// src/analysis/source.rs - Stage hand-off between rule runs and the aggregator
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::io::rule_output::NEW_PAIRS_SUFFIX;
use crate::matching::manager::RuleBatchReport;
use crate::models::pairs::CandidatePair;

/// New pairs keyed by rule id, the input of cross-rule aggregation.
pub type NewPairsByRule = BTreeMap<String, Vec<CandidatePair>>;

/// Anything that can hand stage-one results to the aggregator, whether
/// they are still in memory or were persisted by an earlier run.
pub trait NewPairsSource {
    fn load_new_pairs(&self) -> Result<NewPairsByRule>;
}

impl NewPairsSource for RuleBatchReport {
    fn load_new_pairs(&self) -> Result<NewPairsByRule> {
        Ok(self.new_pairs_by_rule())
    }
}

impl NewPairsSource for NewPairsByRule {
    fn load_new_pairs(&self) -> Result<NewPairsByRule> {
        Ok(self.clone())
    }
}

// Only the columns the aggregator needs are mandatory.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NewPairsRow {
    #[serde(rename = "Principal")]
    principal_id: String,
    #[serde(rename = "Doublon")]
    duplicate_id: String,
    #[serde(rename = "Rule")]
    rule_id: String,
    #[serde(rename = "MatchKey")]
    match_key: String,
    #[serde(rename = "GroupSize")]
    group_size: Option<usize>,
    #[serde(rename = "PrincipalCreatedDate")]
    principal_created_date: String,
    #[serde(rename = "DoublonCreatedDate")]
    duplicate_created_date: String,
}

/// Persisted `<RULE>_<YYYY_MM_DD>_new_pairs.csv` files in one directory.
/// When several dates exist for a rule only the latest file is read.
#[derive(Debug, Clone)]
pub struct NewPairsDirectory {
    dir: PathBuf,
}

impl NewPairsDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Latest new-pairs file per rule id.
    pub fn discover(&self) -> Result<BTreeMap<String, PathBuf>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Rule output directory not found: {}", self.dir.display()))?;

        let mut latest: BTreeMap<String, (String, PathBuf)> = BTreeMap::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list {}", self.dir.display()))?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = file_name.strip_suffix(NEW_PAIRS_SUFFIX) else {
                continue;
            };
            let Some((rule_id, date_token)) = stem.trim_end_matches('_').split_once('_') else {
                continue;
            };
            if rule_id.is_empty() {
                continue;
            }

            let path = entry.path();
            if let Some((existing, existing_path)) = latest.get(rule_id) {
                if existing.as_str() >= date_token {
                    warn!("⚠️  Ignoring {} (superseded by {})", path.display(), existing_path.display());
                    continue;
                }
                warn!("⚠️  Ignoring {} (superseded by {})", existing_path.display(), path.display());
            }
            latest.insert(rule_id.to_string(), (date_token.to_string(), path));
        }
        Ok(latest.into_iter().map(|(rule, (_, path))| (rule, path)).collect())
    }
}

fn read_new_pairs_file(rule_id: &str, path: &Path) -> Result<Vec<CandidatePair>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);
    let mut pairs = Vec::new();
    for (line, row) in reader.deserialize::<NewPairsRow>().enumerate() {
        let row: NewPairsRow = row.with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))?;
        pairs.push(CandidatePair {
            principal_id: row.principal_id,
            duplicate_id: row.duplicate_id,
            rule_id: if row.rule_id.is_empty() { rule_id.to_string() } else { row.rule_id },
            match_key: row.match_key,
            group_size: row.group_size.unwrap_or(0),
            principal_created_date: row.principal_created_date,
            duplicate_created_date: row.duplicate_created_date,
        });
    }
    Ok(pairs)
}

impl NewPairsSource for NewPairsDirectory {
    fn load_new_pairs(&self) -> Result<NewPairsByRule> {
        let files = self.discover()?;
        if files.is_empty() {
            bail!("No *_{} files found in {}", NEW_PAIRS_SUFFIX, self.dir.display());
        }

        let mut by_rule = NewPairsByRule::new();
        for (rule_id, path) in files {
            let pairs = read_new_pairs_file(&rule_id, &path)?;
            debug!("[{}] {} new pairs read from {}", rule_id, pairs.len(), path.display());
            by_rule.insert(rule_id, pairs);
        }
        info!(
            "📂 New pairs of {} rules loaded from {}",
            by_rule.len(),
            self.dir.display()
        );
        Ok(by_rule)
    }
}
