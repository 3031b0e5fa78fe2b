// src/utils/config.rs - Run configuration read from the environment
use log::info;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::analysis::cross_rule::MIN_YEAR_DEFAULT;
use crate::matching::grouping::GROUP_THRESHOLD_DEFAULT;

#[derive(Debug, Clone, PartialEq)]
pub struct DedupeConfig {
    /// Raw contacts export
    pub contacts_file: PathBuf,
    /// Already-declared duplicate pairs
    pub doublons_file: PathBuf,
    /// Normalized base produced by `normalize` and read by `run`
    pub normalized_base: PathBuf,
    /// Per-rule outputs
    pub out_dir: PathBuf,
    /// Cross-rule and per-year analysis outputs
    pub analysis_dir: PathBuf,
    pub group_threshold: usize,
    pub min_year: i32,
    pub max_concurrent_rules: usize,
    /// 0 keeps grouping in memory
    pub spill_partitions: usize,
    /// JSON rule file replacing the built-in registry
    pub rules_file: Option<PathBuf>,
    pub write_contacts: bool,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            contacts_file: PathBuf::from("contacts.csv"),
            doublons_file: PathBuf::from("doublons.csv"),
            normalized_base: PathBuf::from("normalized_contacts.csv"),
            out_dir: PathBuf::from("out"),
            analysis_dir: PathBuf::from("analysis"),
            group_threshold: GROUP_THRESHOLD_DEFAULT,
            min_year: MIN_YEAR_DEFAULT,
            max_concurrent_rules: num_cpus::get(),
            spill_partitions: 0,
            rules_file: None,
            write_contacts: false,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}

impl DedupeConfig {
    /// Create configuration from environment variables. Missing or
    /// unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            contacts_file: env_path("DEDUPE_CONTACTS_FILE", defaults.contacts_file),
            doublons_file: env_path("DEDUPE_DOUBLONS_FILE", defaults.doublons_file),
            normalized_base: env_path("DEDUPE_NORMALIZED_BASE", defaults.normalized_base),
            out_dir: env_path("DEDUPE_OUT_DIR", defaults.out_dir),
            analysis_dir: env_path("DEDUPE_ANALYSIS_DIR", defaults.analysis_dir),
            group_threshold: env_or("DEDUPE_GROUP_THRESHOLD", defaults.group_threshold),
            min_year: env_or("DEDUPE_MIN_YEAR", defaults.min_year),
            max_concurrent_rules: env_or("DEDUPE_MAX_CONCURRENT_RULES", defaults.max_concurrent_rules).max(1),
            spill_partitions: env_or("DEDUPE_SPILL_PARTITIONS", defaults.spill_partitions),
            rules_file: env::var("DEDUPE_RULES_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            write_contacts: env_or("DEDUPE_WRITE_CONTACTS", defaults.write_contacts),
        }
    }

    pub fn log_config(&self) {
        info!("⚙️  Deduplication configuration:");
        info!("   • Contacts file: {}", self.contacts_file.display());
        info!("   • Known duplicates file: {}", self.doublons_file.display());
        info!("   • Normalized base: {}", self.normalized_base.display());
        info!("   • Output dir: {}", self.out_dir.display());
        info!("   • Analysis dir: {}", self.analysis_dir.display());
        info!("   • Group threshold: {}", self.group_threshold);
        info!("   • Minimum year: {}", self.min_year);
        info!("   • Max concurrent rules: {}", self.max_concurrent_rules);
        if self.spill_partitions > 0 {
            info!("   • Grouping spills to {} partitions", self.spill_partitions);
        } else {
            info!("   • Grouping in memory");
        }
        match &self.rules_file {
            Some(path) => info!("   • Rules file: {}", path.display()),
            None => info!("   • Rules: built-in registry"),
        }
        info!("   • Write eligible contacts: {}", self.write_contacts);
    }
}
