// src/matching/manager.rs - Bounded-concurrency execution of many rules
use anyhow::{Context, Result};
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::matching::grouping::GroupingOptions;
use crate::matching::known_pairs::KnownPairIndex;
use crate::matching::rule_runner::{run_rule, RuleRunOutput};
use crate::matching::rules::MatchRule;
use crate::models::contact::ContactRecord;
use crate::models::pairs::CandidatePair;
use crate::models::stats_models::RuleSummary;
use crate::utils::progress_bars::logging::{
    log_batch_completion, log_batch_phase, log_batch_start, log_rule_failed, log_rule_waiting,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule_id: String,
    pub error: String,
}

/// Collected results of a batch, in the order the rules were given.
#[derive(Debug, Clone, Default)]
pub struct RuleBatchReport {
    pub run_id: String,
    pub outputs: Vec<RuleRunOutput>,
    pub failures: Vec<RuleFailure>,
}

impl RuleBatchReport {
    pub fn summaries(&self) -> Vec<&RuleSummary> {
        self.outputs.iter().map(|o| &o.summary).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Stage-one output keyed by rule id, ready for cross-rule aggregation.
    pub fn new_pairs_by_rule(&self) -> BTreeMap<String, Vec<CandidatePair>> {
        self.outputs
            .iter()
            .map(|o| (o.rule_id.clone(), o.new_pairs.clone()))
            .collect()
    }
}

/// Shared read-only inputs for every rule task.
#[derive(Clone)]
pub struct RuleBatchInputs {
    pub records: Arc<Vec<ContactRecord>>,
    pub known_pairs: Arc<KnownPairIndex>,
    pub options: GroupingOptions,
}

/// Runs `rules` on at most `max_concurrent` blocking workers. Each worker
/// reads the shared records and index and owns its own output slot; the
/// report is built after every task has finished.
pub async fn run_rules(
    run_id: &str,
    rules: Vec<MatchRule>,
    inputs: RuleBatchInputs,
    max_concurrent: usize,
    multi_progress: Option<MultiProgress>,
) -> RuleBatchReport {
    let start_time = Instant::now();
    let max_concurrent = max_concurrent.max(1);
    let rule_ids: Vec<String> = rules.iter().map(|r| r.id.clone()).collect();
    log_batch_start(
        run_id,
        &rule_ids,
        max_concurrent,
        inputs.records.len(),
        inputs.known_pairs.len(),
    );

    let batch_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(rules.len() as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.blue} [{elapsed_precise}] {bar:30.green/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Running rules...");
        pb
    });

    log_batch_phase("Task Creation", Some("spawning rule workers"));
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let tasks: Vec<JoinHandle<Result<RuleRunOutput>>> = rules
        .into_iter()
        .map(|rule| spawn_rule_task(rule, inputs.clone(), semaphore.clone(), batch_pb.clone()))
        .collect();

    log_batch_phase("Execution", Some("waiting for all rules to complete"));
    let results = join_all(tasks).await;

    let mut report = RuleBatchReport {
        run_id: run_id.to_string(),
        ..Default::default()
    };
    for (rule_id, joined) in rule_ids.into_iter().zip(results) {
        match joined {
            Ok(Ok(output)) => report.outputs.push(output),
            Ok(Err(e)) => report.failures.push(RuleFailure {
                rule_id,
                error: format!("{:#}", e),
            }),
            Err(e) => {
                log_rule_failed(&rule_id, start_time.elapsed(), &format!("task panicked or was cancelled: {}", e));
                report.failures.push(RuleFailure {
                    rule_id,
                    error: format!("task panicked or was cancelled: {}", e),
                });
            }
        }
    }

    if let Some(pb) = &batch_pb {
        pb.finish_with_message(format!(
            "{} rules done, {} failed",
            report.outputs.len(),
            report.failures.len()
        ));
    }
    log_batch_completion(run_id, start_time.elapsed(), &report.summaries(), report.failures.len());
    report
}

fn spawn_rule_task(
    rule: MatchRule,
    inputs: RuleBatchInputs,
    semaphore: Arc<Semaphore>,
    progress: Option<ProgressBar>,
) -> JoinHandle<Result<RuleRunOutput>> {
    tokio::spawn(async move {
        log_rule_waiting(&rule.id, false);
        let _permit = semaphore
            .acquire_owned()
            .await
            .context("Failed to acquire rule worker permit")?;
        log_rule_waiting(&rule.id, true);

        let task_start = Instant::now();
        let rule_id = rule.id.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_rule(&rule, &inputs.records, &inputs.known_pairs, &inputs.options)
        })
        .await
        .with_context(|| format!("Rule {} worker panicked", rule_id))
        .and_then(|r| r);

        if let Err(e) = &result {
            log_rule_failed(&rule_id, task_start.elapsed(), &format!("{:#}", e));
        }
        if let Some(pb) = &progress {
            pb.inc(1);
            pb.set_message(format!("{} finished", rule_id));
        }
        result
    })
}
