// src/io/known_duplicates.rs
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use log::{info, warn};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

use crate::matching::known_pairs::KnownPairIndex;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeclaredDuplicateRow {
    #[serde(rename = "ContactPrincipal__c")]
    principal_id: String,
    #[serde(rename = "ContactDoublon__c")]
    duplicate_id: String,
    #[serde(rename = "Statut__c")]
    status: String,
}

/// Builds the known-pair index from the declared duplicates export.
/// Rows with a blank principal or duplicate id are discarded.
pub fn load_known_pairs(path: &Path) -> Result<KnownPairIndex> {
    let file = File::open(path)
        .with_context(|| format!("Known duplicates source not found: {}", path.display()))?;
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

    let mut index = KnownPairIndex::new();
    let mut discarded = 0usize;
    for (line, row) in reader.deserialize::<DeclaredDuplicateRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))?;
        if !index.insert(&row.principal_id, &row.duplicate_id, &row.status) {
            discarded += 1;
        }
    }

    if discarded > 0 {
        warn!("⚠️  {} declared duplicates without principal or duplicate id discarded", discarded);
    }
    info!(
        "🗂️  {} declared duplicates loaded ({} distinct directed pairs) from {}",
        index.len(),
        index.pair_count(),
        path.display()
    );
    Ok(index)
}
