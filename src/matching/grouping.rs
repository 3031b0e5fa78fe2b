// src/matching/grouping.rs - Key grouping, principal selection and pair emission
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use crate::matching::eligibility::KeyedRecord;
use crate::models::pairs::{CandidatePair, OversizedGroup};
use crate::utils::dates::parse_created_date;

pub const GROUP_THRESHOLD_DEFAULT: usize = 200;

/// The slice of a contact that grouping needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub id: String,
    pub created_date: Option<DateTime<Utc>>,
    pub created_date_iso: String,
}

impl GroupMember {
    /// Total order used to elect the principal: dated records before
    /// undated ones, earliest date first, then smallest id.
    pub fn principal_sort_key(&self) -> (bool, Option<DateTime<Utc>>, &str) {
        (self.created_date.is_none(), self.created_date, self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyedMember {
    pub match_key: String,
    pub member: GroupMember,
}

impl<'a> From<KeyedRecord<'a>> for KeyedMember {
    fn from(keyed: KeyedRecord<'a>) -> Self {
        Self {
            match_key: keyed.match_key,
            member: GroupMember {
                id: keyed.record.id.clone(),
                created_date: keyed.record.created_date,
                created_date_iso: keyed.record.created_date_iso.clone(),
            },
        }
    }
}

/// How members are bucketed by key before pairing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GroupingStrategy {
    /// Every group held in one ordered map.
    #[default]
    InMemory,
    /// Members are spilled to `partitions` temporary files by key hash and
    /// each partition is grouped on its own, bounding peak memory to the
    /// largest partition.
    Partitioned {
        partitions: usize,
        spill_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingOptions {
    pub group_threshold: usize,
    pub strategy: GroupingStrategy,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            group_threshold: GROUP_THRESHOLD_DEFAULT,
            strategy: GroupingStrategy::InMemory,
        }
    }
}

impl GroupingOptions {
    pub fn with_threshold(group_threshold: usize) -> Self {
        Self {
            group_threshold,
            ..Default::default()
        }
    }

    /// `0` partitions means in-memory grouping.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.strategy = if partitions == 0 {
            GroupingStrategy::InMemory
        } else {
            GroupingStrategy::Partitioned {
                partitions,
                spill_dir: None,
            }
        };
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupingOutcome {
    pub candidate_pairs: Vec<CandidatePair>,
    pub oversized_groups: Vec<OversizedGroup>,
    /// Distinct contact ids among the eligible members.
    pub contacts_involved: usize,
    /// Groups with two or more members, oversized ones included.
    pub multi_member_groups: usize,
}

impl GroupingOutcome {
    fn finish(mut self) -> Self {
        self.candidate_pairs.sort_by(|a, b| {
            (a.match_key.as_str(), a.duplicate_id.as_str())
                .cmp(&(b.match_key.as_str(), b.duplicate_id.as_str()))
        });
        self.oversized_groups.sort_by(|a, b| a.match_key.cmp(&b.match_key));
        self
    }
}

pub fn select_principal(members: &[GroupMember]) -> Option<&GroupMember> {
    members.iter().min_by(|a, b| a.principal_sort_key().cmp(&b.principal_sort_key()))
}

/// Pairs one key group against its principal, or records it as oversized.
/// Groups below two members contribute nothing.
pub fn pair_group(
    rule_id: &str,
    match_key: &str,
    members: &[GroupMember],
    group_threshold: usize,
    outcome: &mut GroupingOutcome,
) {
    let group_size = members.len();
    if group_size < 2 {
        return;
    }
    outcome.multi_member_groups += 1;
    if group_size > group_threshold {
        debug!(
            "Rule {}: group '{}' has {} members (threshold {}), skipping pairing",
            rule_id, match_key, group_size, group_threshold
        );
        outcome.oversized_groups.push(OversizedGroup {
            match_key: match_key.to_string(),
            group_size,
        });
        return;
    }
    let Some(principal) = select_principal(members) else {
        return;
    };
    for member in members.iter().filter(|m| m.id != principal.id) {
        outcome.candidate_pairs.push(CandidatePair {
            principal_id: principal.id.clone(),
            duplicate_id: member.id.clone(),
            rule_id: rule_id.to_string(),
            match_key: match_key.to_string(),
            group_size,
            principal_created_date: principal.created_date_iso.clone(),
            duplicate_created_date: member.created_date_iso.clone(),
        });
    }
}

/// Groups keyed members by exact key equality and emits principal pairs.
///
/// Pairs come back ordered by (match key, duplicate id) and oversized
/// groups by key, whatever the strategy.
pub fn group_and_pair<I>(rule_id: &str, members: I, options: &GroupingOptions) -> Result<GroupingOutcome>
where
    I: IntoIterator<Item = KeyedMember>,
{
    match &options.strategy {
        GroupingStrategy::InMemory => Ok(group_in_memory(rule_id, members, options.group_threshold)),
        GroupingStrategy::Partitioned {
            partitions,
            spill_dir,
        } => group_partitioned(
            rule_id,
            members,
            (*partitions).max(1),
            spill_dir.as_ref(),
            options.group_threshold,
        ),
    }
}

fn group_in_memory<I>(rule_id: &str, members: I, group_threshold: usize) -> GroupingOutcome
where
    I: IntoIterator<Item = KeyedMember>,
{
    let mut ids = HashSet::new();
    let mut groups: BTreeMap<String, Vec<GroupMember>> = BTreeMap::new();
    for keyed in members {
        ids.insert(keyed.member.id.clone());
        groups.entry(keyed.match_key).or_default().push(keyed.member);
    }

    let mut outcome = GroupingOutcome {
        contacts_involved: ids.len(),
        ..Default::default()
    };
    for (key, group) in &groups {
        pair_group(rule_id, key, group, group_threshold, &mut outcome);
    }
    outcome.finish()
}

#[derive(Debug, Serialize, Deserialize)]
struct SpillRow {
    match_key: String,
    id: String,
    created_date_iso: String,
}

fn partition_for(match_key: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    match_key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

fn group_partitioned<I>(
    rule_id: &str,
    members: I,
    partitions: usize,
    spill_root: Option<&PathBuf>,
    group_threshold: usize,
) -> Result<GroupingOutcome>
where
    I: IntoIterator<Item = KeyedMember>,
{
    let mut builder = tempfile::Builder::new();
    builder.prefix("dedupe-spill-");
    let spill_dir = match spill_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .context("Failed to create spill directory for partitioned grouping")?;

    let paths: Vec<PathBuf> = (0..partitions)
        .map(|i| spill_dir.path().join(format!("{}_partition_{:04}.csv", rule_id, i)))
        .collect();

    let mut ids = HashSet::new();
    {
        let mut writers = paths
            .iter()
            .map(|path| {
                csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_path(path)
                    .with_context(|| format!("Failed to create spill file {}", path.display()))
            })
            .collect::<Result<Vec<csv::Writer<File>>>>()?;

        for keyed in members {
            ids.insert(keyed.member.id.clone());
            let partition = partition_for(&keyed.match_key, partitions);
            writers[partition]
                .serialize(SpillRow {
                    match_key: keyed.match_key,
                    id: keyed.member.id,
                    created_date_iso: keyed.member.created_date_iso,
                })
                .context("Failed to write spill row")?;
        }
        for writer in writers.iter_mut() {
            writer.flush().context("Failed to flush spill file")?;
        }
    }

    let mut outcome = GroupingOutcome {
        contacts_involved: ids.len(),
        ..Default::default()
    };
    drop(ids);

    for path in &paths {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("Failed to open spill file {}", path.display()))?;
        let mut groups: BTreeMap<String, Vec<GroupMember>> = BTreeMap::new();
        for row in reader.deserialize::<SpillRow>() {
            let row = row.with_context(|| format!("Corrupt spill row in {}", path.display()))?;
            groups.entry(row.match_key).or_default().push(GroupMember {
                created_date: parse_created_date(&row.created_date_iso),
                id: row.id,
                created_date_iso: row.created_date_iso,
            });
        }
        debug!(
            "Rule {}: partition {} holds {} keys",
            rule_id,
            path.display(),
            groups.len()
        );
        for (key, group) in &groups {
            pair_group(rule_id, key, group, group_threshold, &mut outcome);
        }
    }

    Ok(outcome.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, created: &str) -> GroupMember {
        GroupMember {
            id: id.to_string(),
            created_date: parse_created_date(created),
            created_date_iso: parse_created_date(created)
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
        }
    }

    fn keyed(key: &str, id: &str, created: &str) -> KeyedMember {
        KeyedMember {
            match_key: key.to_string(),
            member: member(id, created),
        }
    }

    #[test]
    fn test_principal_is_earliest_valid_date() {
        let members = vec![
            member("a", "2022-01-01"),
            member("b", "2021-06-15"),
            member("c", ""),
        ];
        assert_eq!(select_principal(&members).unwrap().id, "b");
    }

    #[test]
    fn test_principal_falls_back_to_smallest_id() {
        let members = vec![member("c9", ""), member("a1", ""), member("b5", "")];
        assert_eq!(select_principal(&members).unwrap().id, "a1");

        let members = vec![member("z", "2020-01-01"), member("m", "2020-01-01")];
        assert_eq!(select_principal(&members).unwrap().id, "m");
    }

    #[test]
    fn test_star_pairs_with_principal() {
        let members = vec![
            keyed("K", "3", "2020-03-01"),
            keyed("K", "1", "2020-01-01"),
            keyed("K", "2", ""),
            keyed("SOLO", "4", "2020-01-01"),
        ];
        let outcome = group_and_pair("R1", members, &GroupingOptions::default()).unwrap();

        assert_eq!(outcome.contacts_involved, 4);
        assert_eq!(outcome.multi_member_groups, 1);
        assert_eq!(outcome.candidate_pairs.len(), 2);
        for pair in &outcome.candidate_pairs {
            assert_eq!(pair.principal_id, "1");
            assert_eq!(pair.rule_id, "R1");
            assert_eq!(pair.match_key, "K");
            assert_eq!(pair.group_size, 3);
            assert_eq!(pair.principal_created_date, "2020-01-01T00:00:00+00:00");
        }
        let duplicates: Vec<_> = outcome.candidate_pairs.iter().map(|p| p.duplicate_id.as_str()).collect();
        assert_eq!(duplicates, vec!["2", "3"]);
        assert_eq!(outcome.candidate_pairs[0].duplicate_created_date, "");
    }

    #[test]
    fn test_oversized_group_is_excluded() {
        let threshold = 5;
        let members: Vec<_> = (0..=threshold)
            .map(|i| keyed("BIG", &format!("id{:02}", i), ""))
            .collect();
        let outcome = group_and_pair("R1", members, &GroupingOptions::with_threshold(threshold)).unwrap();

        assert!(outcome.candidate_pairs.is_empty());
        assert_eq!(
            outcome.oversized_groups,
            vec![OversizedGroup { match_key: "BIG".to_string(), group_size: threshold + 1 }]
        );

        // Exactly at the threshold the group is still paired.
        let members: Vec<_> = (0..threshold)
            .map(|i| keyed("BIG", &format!("id{:02}", i), ""))
            .collect();
        let outcome = group_and_pair("R1", members, &GroupingOptions::with_threshold(threshold)).unwrap();
        assert_eq!(outcome.candidate_pairs.len(), threshold - 1);
        assert!(outcome.oversized_groups.is_empty());
    }

    #[test]
    fn test_repeated_id_never_pairs_with_itself() {
        let members = vec![keyed("K", "1", "2020-01-01"), keyed("K", "1", "2021-01-01")];
        let outcome = group_and_pair("R1", members, &GroupingOptions::default()).unwrap();
        assert!(outcome.candidate_pairs.is_empty());
        assert_eq!(outcome.contacts_involved, 1);
    }

    fn sample_members() -> Vec<KeyedMember> {
        let mut members = Vec::new();
        for g in 0..40 {
            for m in 0..(g % 5) {
                let created = if m % 3 == 0 { String::new() } else { format!("20{:02}-01-0{}", 10 + m, 1 + g % 9) };
                members.push(keyed(&format!("KEY{:03}", g), &format!("c{:03}_{}", g, m), &created));
            }
        }
        members
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let first = group_and_pair("R1", sample_members(), &GroupingOptions::default()).unwrap();
        let mut reversed = sample_members();
        reversed.reverse();
        let second = group_and_pair("R1", reversed, &GroupingOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partitioned_grouping_matches_in_memory() {
        let options = GroupingOptions::with_threshold(3);
        let in_memory = group_and_pair("R1", sample_members(), &options).unwrap();

        let spill_root = tempfile::tempdir().unwrap();
        let partitioned_options = GroupingOptions {
            group_threshold: 3,
            strategy: GroupingStrategy::Partitioned {
                partitions: 7,
                spill_dir: Some(spill_root.path().to_path_buf()),
            },
        };
        let partitioned = group_and_pair("R1", sample_members(), &partitioned_options).unwrap();

        assert_eq!(in_memory, partitioned);
        assert!(!partitioned.oversized_groups.is_empty());
        // Spill files are removed once grouping is done.
        assert_eq!(std::fs::read_dir(spill_root.path()).unwrap().count(), 0);
    }
}
