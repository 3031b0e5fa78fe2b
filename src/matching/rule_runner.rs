// src/matching/rule_runner.rs - One rule: eligibility, grouping, known-pair reconciliation
use anyhow::{Context, Result};

use crate::matching::eligibility::keyed_records;
use crate::matching::grouping::{group_and_pair, GroupingOptions, KeyedMember};
use crate::matching::known_pairs::{filter_known_pairs, KnownPairIndex};
use crate::matching::rules::MatchRule;
use crate::models::contact::ContactRecord;
use crate::models::pairs::{CandidatePair, OversizedGroup};
use crate::models::stats_models::RuleSummary;
use crate::utils::progress_bars::logging::RuleLogger;

/// Everything one rule run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRunOutput {
    pub rule_id: String,
    pub new_pairs: Vec<CandidatePair>,
    pub summary: RuleSummary,
    pub oversized_groups: Vec<OversizedGroup>,
}

/// Runs `rule` over the normalized records. A pure function of its inputs:
/// running it twice gives the same output.
pub fn run_rule(
    rule: &MatchRule,
    records: &[ContactRecord],
    known_pairs: &KnownPairIndex,
    options: &GroupingOptions,
) -> Result<RuleRunOutput> {
    let logger = RuleLogger::new(&rule.id);
    let codes: Vec<&str> = rule.fields.iter().map(|f| f.code()).collect();
    logger.log_start(&rule.label, &codes, options.group_threshold);

    logger.log_phase("Grouping", Some("building match keys and grouping eligible contacts"));
    let members = keyed_records(records, &rule.fields).map(KeyedMember::from);
    let grouping = match group_and_pair(&rule.id, members, options) {
        Ok(grouping) => grouping,
        Err(e) => {
            logger.log_error(&format!("Grouping failed: {:#}", e));
            return Err(e).with_context(|| format!("Rule {}: grouping failed", rule.id));
        }
    };

    if grouping.contacts_involved == 0 {
        logger.log_no_eligible_records();
        return Ok(RuleRunOutput {
            rule_id: rule.id.clone(),
            new_pairs: Vec::new(),
            summary: RuleSummary::empty(&rule.id, &rule.label),
            oversized_groups: Vec::new(),
        });
    }
    logger.log_eligibility(records.len(), grouping.contacts_involved);
    logger.log_grouping(
        grouping.multi_member_groups,
        grouping.candidate_pairs.len(),
        grouping.oversized_groups.len(),
    );

    logger.log_phase("Known-pair reconciliation", None);
    let total_pairs = grouping.candidate_pairs.len();
    let filtered = filter_known_pairs(grouping.candidate_pairs, known_pairs);
    logger.log_known_pair_filtering(total_pairs, filtered.already_declared, filtered.new_pairs.len());

    let summary = RuleSummary {
        rule: rule.id.clone(),
        name: rule.label.clone(),
        contacts: grouping.contacts_involved,
        pairs: total_pairs,
        already_declared: filtered.already_declared,
        new_pairs: filtered.new_pairs.len(),
        status_distribution: filtered.status_distribution,
        groups_too_large: grouping.oversized_groups.len(),
    };
    logger.log_completion(&summary);

    Ok(RuleRunOutput {
        rule_id: rule.id.clone(),
        new_pairs: filtered.new_pairs,
        summary,
        oversized_groups: grouping.oversized_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contact::ContactField::*;
    use crate::utils::dates::bucket_year;

    fn household_rule() -> MatchRule {
        MatchRule::new("H1", "Household × postal code", &[LastName, PostalCode, City])
    }

    fn scenario_records() -> Vec<ContactRecord> {
        let dates = ["", "2020-05-01", "2022-01-01", "2022-01-01", "2019-01-01"];
        dates
            .iter()
            .enumerate()
            .map(|(i, date)| {
                ContactRecord::new(format!("003{}", i))
                    .with_field(LastName, "LEROY")
                    .with_field(PostalCode, "75011")
                    .with_field(City, "PARIS")
                    .with_created_date(date)
            })
            .collect()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let records = scenario_records();
        let rule = household_rule();

        let output = run_rule(&rule, &records, &KnownPairIndex::new(), &GroupingOptions::default()).unwrap();
        assert_eq!(output.summary.contacts, 5);
        assert_eq!(output.summary.pairs, 4);
        assert_eq!(output.new_pairs.len(), 4);
        assert!(output.new_pairs.iter().all(|p| p.principal_id == "0034"));
        assert!(output.new_pairs.iter().all(|p| p.group_size == 5));
        assert!(output.new_pairs.iter().all(|p| p.match_key == "LEROY75011PARIS"));

        let known = KnownPairIndex::from_triples(vec![("0034", "0032", "Traité")]);
        let output = run_rule(&rule, &records, &known, &GroupingOptions::default()).unwrap();
        assert_eq!(output.new_pairs.len(), 3);
        assert_eq!(output.summary.already_declared, 1);
        assert_eq!(output.summary.new_pairs, 3);
        assert_eq!(output.summary.status_distribution.get("Traité"), Some(&1));
        assert!(output.new_pairs.iter().all(|p| p.duplicate_id != "0032"));

        // The principal keeps its original 2019 timestamp; only year bucketing floors it.
        assert_eq!(output.new_pairs[0].principal_created_date, "2019-01-01T00:00:00+00:00");
        let years: Vec<_> = output
            .new_pairs
            .iter()
            .map(|p| bucket_year(&p.duplicate_created_date, 2021))
            .collect();
        assert_eq!(years, vec![None, Some(2021), Some(2022)]);
    }

    #[test]
    fn test_inverse_declaration_is_suppressed() {
        let records = scenario_records();
        let known = KnownPairIndex::from_triples(vec![("0031", "0034", "Open")]);
        let output = run_rule(&household_rule(), &records, &known, &GroupingOptions::default()).unwrap();
        assert_eq!(output.summary.already_declared, 1);
        assert_eq!(output.summary.status_distribution.get("declared_inverse"), Some(&1));
        assert!(output.new_pairs.iter().all(|p| p.duplicate_id != "0031"));
    }

    #[test]
    fn test_no_eligible_records_gives_empty_summary() {
        let records = vec![ContactRecord::new("1").with_field(LastName, "SOLO")];
        let output = run_rule(&household_rule(), &records, &KnownPairIndex::new(), &GroupingOptions::default()).unwrap();
        assert_eq!(output.summary, RuleSummary::empty("H1", "Household × postal code"));
        assert!(output.new_pairs.is_empty());
    }

    #[test]
    fn test_oversized_group_counts_in_summary() {
        let records = scenario_records();
        let output = run_rule(
            &household_rule(),
            &records,
            &KnownPairIndex::new(),
            &GroupingOptions::with_threshold(4),
        )
        .unwrap();
        assert_eq!(output.summary.pairs, 0);
        assert_eq!(output.summary.groups_too_large, 1);
        assert_eq!(output.summary.contacts, 5);
        assert_eq!(output.oversized_groups[0].group_size, 5);
    }

    #[test]
    fn test_rerun_is_identical() {
        let records = scenario_records();
        let options = GroupingOptions::default().with_partitions(3);
        let first = run_rule(&household_rule(), &records, &KnownPairIndex::new(), &options).unwrap();
        let second = run_rule(&household_rule(), &records, &KnownPairIndex::new(), &options).unwrap();
        assert_eq!(first, second);
    }
}
