// src/analysis/report.rs - Analysis steps behind the by-year, cross, summary and analyze commands
use anyhow::Result;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

use crate::analysis::cross_rule::{aggregate_cross_rule, count_new_pairs_by_year, summarize_cross_rule};
use crate::analysis::source::NewPairsSource;
use crate::io::analysis_output::{read_cross_analysis, write_cross_analysis, write_cross_summary, write_millesime};
use crate::models::stats_models::{CrossPairRecord, YearlySummary};

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    pub analysis_dir: PathBuf,
    pub min_year: i32,
    pub min_rules: usize,
}

/// Per-rule yearly counts, written to `millesime.csv`.
pub fn write_yearly_counts(source: &dyn NewPairsSource, options: &AnalysisOptions) -> Result<PathBuf> {
    let new_pairs = source.load_new_pairs()?;
    let counts = count_new_pairs_by_year(&new_pairs, options.min_year);
    if counts.is_empty() {
        warn!("⚠️  No new pair with a usable creation date");
    }
    write_millesime(&options.analysis_dir, &counts)
}

/// Consolidated cross-rule table, written to `cross_analysis.csv`.
pub fn write_cross_table(source: &dyn NewPairsSource, options: &AnalysisOptions) -> Result<Vec<CrossPairRecord>> {
    let new_pairs = source.load_new_pairs()?;
    let records = aggregate_cross_rule(&new_pairs, options.min_year);
    write_cross_analysis(&options.analysis_dir, &records)?;
    Ok(records)
}

/// Yearly summary computed from a previously written `cross_analysis.csv`.
pub fn write_summary_from_cross_table(options: &AnalysisOptions) -> Result<Vec<YearlySummary>> {
    let records = read_cross_analysis(&options.analysis_dir)?;
    let summary = summarize_cross_rule(&records, options.min_rules);
    write_cross_summary(&options.analysis_dir, &summary, options.min_rules)?;
    Ok(summary)
}

/// All analysis outputs from one load of the stage-one results.
pub fn analyze(source: &dyn NewPairsSource, options: &AnalysisOptions) -> Result<Vec<YearlySummary>> {
    let start = Instant::now();
    let new_pairs = source.load_new_pairs()?;

    let counts = count_new_pairs_by_year(&new_pairs, options.min_year);
    write_millesime(&options.analysis_dir, &counts)?;

    let records = aggregate_cross_rule(&new_pairs, options.min_year);
    write_cross_analysis(&options.analysis_dir, &records)?;

    let summary = summarize_cross_rule(&records, options.min_rules);
    write_cross_summary(&options.analysis_dir, &summary, options.min_rules)?;
    info!("✅ Cross-rule analysis completed in {:.2?}", start.elapsed());
    Ok(summary)
}
