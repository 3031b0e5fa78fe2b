// src/utils/progress_bars/logging.rs - Logging helpers for rule runs and batches
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

use crate::models::stats_models::RuleSummary;

/// Emoji tag for a rule family, keyed on the id's first letter.
pub fn rule_emoji(rule_id: &str) -> &'static str {
    match rule_id.chars().next() {
        Some('A') => "📋",
        Some('B') => "👤",
        Some('C') => "🏠",
        _ => "⚙️",
    }
}

#[derive(Clone)]
pub struct RuleLogger {
    rule_id: String,
    rule_emoji: &'static str,
    start_time: Instant,
}

impl RuleLogger {
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            rule_emoji: rule_emoji(rule_id),
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, label: &str, field_codes: &[&str], group_threshold: usize) {
        info!(
            "[{}] {} 🚀 Running rule: {} (fields: {})",
            self.rule_id,
            self.rule_emoji,
            label,
            field_codes.join(", ")
        );
        debug!(
            "[{}] {} ⚙️  Group threshold: {}",
            self.rule_id, self.rule_emoji, group_threshold
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.rule_id, self.rule_emoji, phase, details, elapsed.as_secs_f32()
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.rule_id, self.rule_emoji, phase, elapsed.as_secs_f32()
            ),
        }
    }

    pub fn log_eligibility(&self, total_records: usize, contacts_involved: usize) {
        let percent = if total_records > 0 {
            (contacts_involved as f64 / total_records as f64) * 100.0
        } else {
            0.0
        };
        info!(
            "[{}] {} 📊 {} of {} contacts eligible ({:.1}%)",
            self.rule_id, self.rule_emoji, contacts_involved, total_records, percent
        );
    }

    pub fn log_no_eligible_records(&self) {
        info!(
            "[{}] {} ✨ No records eligible for this rule",
            self.rule_id, self.rule_emoji
        );
    }

    pub fn log_grouping(&self, multi_member_groups: usize, candidate_pairs: usize, oversized: usize) {
        info!(
            "[{}] {} 📈 {} groups with 2+ contacts → {} candidate pairs",
            self.rule_id, self.rule_emoji, multi_member_groups, candidate_pairs
        );
        if oversized > 0 {
            warn!(
                "[{}] {} ⚠️  {} oversized groups skipped (see groups_too_large output)",
                self.rule_id, self.rule_emoji, oversized
            );
        }
    }

    pub fn log_known_pair_filtering(&self, total_pairs: usize, already_declared: usize, new_pairs: usize) {
        let percent_new = if total_pairs > 0 {
            (new_pairs as f64 / total_pairs as f64) * 100.0
        } else {
            0.0
        };
        info!(
            "[{}] {} 🎯 Known-pair check: {} total → {} new ({:.1}%), {} already declared",
            self.rule_id, self.rule_emoji, total_pairs, new_pairs, percent_new, already_declared
        );
    }

    pub fn log_completion(&self, summary: &RuleSummary) {
        info!(
            "[{}] {} 🎉 COMPLETED in {:.2?}: contacts={} pairs={} new_pairs={} already_declared={}",
            self.rule_id,
            self.rule_emoji,
            self.start_time.elapsed(),
            summary.contacts,
            summary.pairs,
            summary.new_pairs,
            summary.already_declared
        );
    }

    pub fn log_error(&self, message: &str) {
        error!("[{}] {} ❌ {}", self.rule_id, self.rule_emoji, message);
    }
}

// Batch-level logging functions
pub fn log_batch_start(run_id: &str, rule_ids: &[String], concurrency_limit: usize, record_count: usize, known_pairs: usize) {
    info!("🚀 ===== RULE BATCH STARTING =====");
    info!("📅 Run ID: {}", run_id);
    info!("⚙️  Configuration:");
    info!("   • {} rules selected: {}", rule_ids.len(), rule_ids.join(", "));
    info!("   • Concurrency limit: {} simultaneous rules", concurrency_limit);
    info!("   • {} normalized contacts, {} known duplicate declarations", record_count, known_pairs);
    info!("==================================");
}

pub fn log_batch_phase(phase: &str, details: Option<&str>) {
    match details {
        Some(details) => info!("🔄 Batch Phase: {} - {}", phase, details),
        None => info!("🔄 Batch Phase: {}", phase),
    }
}

pub fn log_rule_waiting(rule_id: &str, slot_acquired: bool) {
    if slot_acquired {
        info!("🚦 [{}] {} Processing slot acquired", rule_id, rule_emoji(rule_id));
    } else {
        debug!("⏳ [{}] {} Waiting for processing slot...", rule_id, rule_emoji(rule_id));
    }
}

pub fn log_rule_failed(rule_id: &str, duration: Duration, error: &str) {
    error!(
        "❌ [{}] {} rule failed after {:.2?}: {}",
        rule_id,
        rule_emoji(rule_id),
        duration,
        error
    );
}

pub fn log_batch_completion(run_id: &str, duration: Duration, summaries: &[&RuleSummary], failures: usize) {
    info!("🎉 ===== RULE BATCH COMPLETED =====");
    info!("📅 Run ID: {}", run_id);
    info!("⏱️  Total Duration: {:.2?}", duration);
    info!("📈 Rule Breakdown:");

    let mut total_new = 0;
    for summary in summaries {
        total_new += summary.new_pairs;
        info!(
            "  {} {}: contacts={} pairs={} new_pairs={} already_declared={} groups_too_large={}",
            rule_emoji(&summary.rule),
            summary.rule,
            summary.contacts,
            summary.pairs,
            summary.new_pairs,
            summary.already_declared,
            summary.groups_too_large
        );
    }

    info!("📊 Summary:");
    info!("  • New pairs across all rules: {}", total_new);
    if failures > 0 {
        warn!("  • ⚠️  {} rules failed", failures);
    }
    info!("===================================");
}
