// src/io/contacts.rs - Raw contact export ingestion and the normalized base
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::time::Instant;

use super::write_csv_atomic;
use crate::matching::normalize::normalize_record;
use crate::models::contact::ContactRecord;

/// Rows between progress log lines while streaming the raw export.
pub const CHUNK_SIZE: usize = 200_000;

const NORMALIZED_HEADER: [&str; 15] = [
    "Id", "CreatedDate", "CreatedDate_parsed", "LN", "FN", "ST1", "ST2", "ST3", "ST4", "PC", "CITY",
    "EMAIL", "MOBILE", "HOME", "SAL",
];

/// One row of the CRM contact export. Absent columns read as empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawContactRow {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "CreatedDate")]
    pub created_date: String,
    #[serde(rename = "LastNameSearchable__c")]
    pub last_name: String,
    #[serde(rename = "FirstNameSearchable__c")]
    pub first_name: String,
    #[serde(rename = "MailingStreet1__c")]
    pub street1: String,
    #[serde(rename = "MailingStreet2__c")]
    pub street2: String,
    #[serde(rename = "MailingStreet3__c")]
    pub street3: String,
    #[serde(rename = "MailingStreet4__c")]
    pub street4: String,
    #[serde(rename = "MailingPostalCode")]
    pub postal_code: String,
    #[serde(rename = "MailingCity")]
    pub city: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "MobilePhone")]
    pub mobile_phone: String,
    #[serde(rename = "HomePhone")]
    pub home_phone: String,
    #[serde(rename = "Salutation")]
    pub salutation: String,
}

/// One row of the normalized base file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedRow {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "CreatedDate")]
    pub created_date: String,
    #[serde(rename = "CreatedDate_parsed")]
    pub created_date_parsed: String,
    #[serde(rename = "LN")]
    pub last_name: String,
    #[serde(rename = "FN")]
    pub first_name: String,
    #[serde(rename = "ST1")]
    pub street1: String,
    #[serde(rename = "ST2")]
    pub street2: String,
    #[serde(rename = "ST3")]
    pub street3: String,
    #[serde(rename = "ST4")]
    pub street4: String,
    #[serde(rename = "PC")]
    pub postal_code: String,
    #[serde(rename = "CITY")]
    pub city: String,
    #[serde(rename = "EMAIL")]
    pub email: String,
    #[serde(rename = "MOBILE")]
    pub mobile_phone: String,
    #[serde(rename = "HOME")]
    pub home_phone: String,
    #[serde(rename = "SAL")]
    pub salutation: String,
}

impl NormalizedRow {
    fn from_record(record: &ContactRecord, raw_created_date: &str) -> Self {
        Self {
            id: record.id.clone(),
            created_date: raw_created_date.trim().to_string(),
            created_date_parsed: record.created_date_iso.clone(),
            last_name: record.last_name.clone(),
            first_name: record.first_name.clone(),
            street1: record.street1.clone(),
            street2: record.street2.clone(),
            street3: record.street3.clone(),
            street4: record.street4.clone(),
            postal_code: record.postal_code.clone(),
            city: record.city.clone(),
            email: record.email.clone(),
            mobile_phone: record.mobile_phone.clone(),
            home_phone: record.home_phone.clone(),
            salutation: record.salutation.clone(),
        }
    }

    fn into_record(self) -> ContactRecord {
        // The parsed column is canonical; the raw one is a fallback for
        // bases written by other tools.
        let created = if self.created_date_parsed.trim().is_empty() {
            self.created_date.clone()
        } else {
            self.created_date_parsed.clone()
        };
        ContactRecord {
            id: self.id.trim().to_string(),
            salutation: self.salutation,
            first_name: self.first_name,
            last_name: self.last_name,
            street1: self.street1,
            street2: self.street2,
            street3: self.street3,
            street4: self.street4,
            postal_code: self.postal_code,
            city: self.city,
            email: self.email,
            mobile_phone: self.mobile_phone,
            home_phone: self.home_phone,
            ..Default::default()
        }
        .with_created_date(&created)
    }
}

/// Normalizes one raw export row.
pub fn normalize_raw_row(row: &RawContactRow) -> ContactRecord {
    let mut record = ContactRecord {
        id: row.id.trim().to_string(),
        salutation: row.salutation.clone(),
        first_name: row.first_name.clone(),
        last_name: row.last_name.clone(),
        street1: row.street1.clone(),
        street2: row.street2.clone(),
        street3: row.street3.clone(),
        street4: row.street4.clone(),
        postal_code: row.postal_code.clone(),
        city: row.city.clone(),
        email: row.email.clone(),
        mobile_phone: row.mobile_phone.clone(),
        home_phone: row.home_phone.clone(),
        ..Default::default()
    };
    normalize_record(&mut record);
    record.set_created_date(&row.created_date);
    record
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows_read: usize,
    pub rows_written: usize,
    pub skipped_without_id: usize,
    pub missing_created_date: usize,
}

/// Streams the raw export at `input`, writing the normalized base to
/// `output`. The output only replaces an existing file once fully written.
pub fn normalize_contacts_to_base(input: &Path, output: &Path) -> Result<NormalizeStats> {
    let start = Instant::now();
    info!("📥 Normalizing contacts from {}", input.display());
    let file = File::open(input)
        .with_context(|| format!("Contacts source not found: {}", input.display()))?;
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

    let mut stats = NormalizeStats::default();
    write_csv_atomic(output, &NORMALIZED_HEADER, |writer| {
        for (line, row) in reader.deserialize::<RawContactRow>().enumerate() {
            let row = row.with_context(|| format!("Malformed contact row {} in {}", line + 2, input.display()))?;
            stats.rows_read += 1;

            if row.id.trim().is_empty() {
                stats.skipped_without_id += 1;
                continue;
            }
            let record = normalize_raw_row(&row);
            if record.created_date.is_none() {
                stats.missing_created_date += 1;
            }
            writer
                .serialize(NormalizedRow::from_record(&record, &row.created_date))
                .context("Failed to write normalized contact")?;
            stats.rows_written += 1;

            if stats.rows_read % CHUNK_SIZE == 0 {
                info!(
                    "   📦 {} rows normalized [+{:.1}s]",
                    stats.rows_read,
                    start.elapsed().as_secs_f32()
                );
            }
        }
        Ok(())
    })?;

    if stats.skipped_without_id > 0 {
        warn!("⚠️  {} contact rows without Id skipped", stats.skipped_without_id);
    }
    info!(
        "✅ Normalized base written to {}: {} contacts ({} without a usable CreatedDate) in {:.2?}",
        output.display(),
        stats.rows_written,
        stats.missing_created_date,
        start.elapsed()
    );
    Ok(stats)
}

/// Loads the normalized base. Duplicate ids are an input error.
pub fn load_normalized_base(path: &Path) -> Result<Vec<ContactRecord>> {
    let start = Instant::now();
    let file = File::open(path)
        .with_context(|| format!("Normalized base not found: {}", path.display()))?;
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

    let mut records = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (line, row) in reader.deserialize::<NormalizedRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))?;
        let record = row.into_record();
        if record.id.is_empty() {
            continue;
        }
        if !seen.insert(record.id.clone()) {
            bail!("Duplicate contact Id '{}' in {}", record.id, path.display());
        }
        records.push(record);
    }
    debug!("Loaded {} normalized contacts in {:.2?}", records.len(), start.elapsed());
    info!("📇 {} normalized contacts loaded from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const RAW: &str = "\
Id,CreatedDate,LastNameSearchable__c,FirstNameSearchable__c,MailingStreet1__c,MailingPostalCode,MailingCity,Email,MobilePhone,Salutation
0031,2021-03-04T10:00:00.000+0000,Lefèvre,  Zoé ,12 rue de l'Église,75011,Paris,Zoe@Mail.fr ,06 11 22 33 44,Mme
0032,,LEFEVRE,ZOE,,75011,PARIS,,,
,2021-01-01,Ghost,,,,,,,
0033,garbage,Martin,Paul,,,,,+33 6 00,M
";

    #[test]
    fn test_normalize_and_reload_base() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("contacts.csv");
        let output = dir.path().join("base").join("normalized.csv");
        fs::write(&input, RAW).unwrap();

        let stats = normalize_contacts_to_base(&input, &output).unwrap();
        assert_eq!(stats.rows_read, 4);
        assert_eq!(stats.rows_written, 3);
        assert_eq!(stats.skipped_without_id, 1);
        assert_eq!(stats.missing_created_date, 2);

        let records = load_normalized_base(&output).unwrap();
        assert_eq!(records.len(), 3);

        let zoe = &records[0];
        assert_eq!(zoe.id, "0031");
        assert_eq!(zoe.last_name, "LEFEVRE");
        assert_eq!(zoe.first_name, "ZOE");
        assert_eq!(zoe.street1, "12 RUE DE L EGLISE");
        assert_eq!(zoe.mobile_phone, "0611223344");
        assert_eq!(zoe.street2, "");
        assert_eq!(zoe.created_date_iso, "2021-03-04T10:00:00+00:00");

        assert_eq!(records[1].created_date, None);
        assert_eq!(records[2].created_date, None);
        assert_eq!(records[1].last_name, zoe.last_name);
    }

    #[test]
    fn test_missing_source_is_an_error_and_keeps_previous_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("normalized.csv");
        fs::write(&output, "Id\nkeep\n").unwrap();

        let err = normalize_contacts_to_base(&dir.path().join("absent.csv"), &output).unwrap_err();
        assert!(format!("{:#}", err).contains("Contacts source not found"));
        assert_eq!(fs::read_to_string(&output).unwrap(), "Id\nkeep\n");
        assert!(load_normalized_base(&dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("normalized.csv");
        fs::write(&base, "Id,LN\n1,A\n1,B\n").unwrap();
        assert!(load_normalized_base(&base).is_err());
    }
}
