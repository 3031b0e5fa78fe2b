// src/main.rs
use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dedupe_lib::{
    analysis::{
        report::{analyze, write_cross_table, write_summary_from_cross_table, write_yearly_counts},
        AnalysisOptions, NewPairsDirectory,
    },
    io::{contacts::{load_normalized_base, normalize_contacts_to_base}, known_duplicates::load_known_pairs, rule_output::RuleOutputWriter},
    matching::{run_rules, GroupingOptions, RuleBatchInputs, RuleRegistry},
    utils::{config::DedupeConfig, env::load_env, get_memory_usage, progress_bars::progress_config::ProgressConfig},
};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Rule-based contact deduplication", long_about = None)]
struct Cli {
    /// Directory of per-rule outputs (overrides DEDUPE_OUT_DIR)
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    /// Directory of analysis outputs (overrides DEDUPE_ANALYSIS_DIR)
    #[arg(long, global = true)]
    analysis_dir: Option<PathBuf>,

    /// Years at or below this one are bucketed together (overrides DEDUPE_MIN_YEAR)
    #[arg(long, global = true)]
    min_year: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize the raw contacts export into the normalized base
    Normalize {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run matching rules against the normalized base
    Run(RunArgs),
    /// Count new pairs per rule and creation year
    ByYear,
    /// Consolidate new pairs across rules
    Cross,
    /// Yearly summary of the consolidated table
    Summary {
        /// Keep only pairs found by at least this many rules
        #[arg(long, default_value_t = 1)]
        min_rules: usize,
    },
    /// Yearly counts, consolidation and summary in one pass
    Analyze {
        #[arg(long, default_value_t = 1)]
        min_rules: usize,
    },
    /// Print the active rule registry
    ListRules(RegistryArgs),
}

#[derive(Args)]
struct RegistryArgs {
    /// JSON rule definitions replacing the built-in registry
    #[arg(long)]
    rules_file: Option<PathBuf>,

    /// Use the first-generation 9-rule set
    #[arg(long)]
    first_generation: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Comma-separated rule ids
    #[arg(long, value_delimiter = ',')]
    rules: Vec<String>,

    /// Comma-separated rule id prefixes
    #[arg(long, value_delimiter = ',')]
    prefix: Vec<String>,

    #[arg(long)]
    group_threshold: Option<usize>,

    /// Also write each rule's eligible contacts with their match key
    #[arg(long)]
    write_contacts: bool,

    /// Spill grouping to this many temporary partitions (0 = in memory)
    #[arg(long)]
    spill_partitions: Option<usize>,

    /// Maximum number of rules running at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Run the cross-rule analysis on the in-memory results afterwards
    #[arg(long)]
    analyze: bool,

    #[arg(long, default_value_t = 1)]
    min_rules: usize,

    #[command(flatten)]
    registry: RegistryArgs,
}

fn load_registry(args: &RegistryArgs, config: &DedupeConfig) -> Result<RuleRegistry> {
    if let Some(path) = args.rules_file.as_ref().or(config.rules_file.as_ref()) {
        return RuleRegistry::from_json_file(path);
    }
    if args.first_generation {
        Ok(RuleRegistry::first_generation())
    } else {
        Ok(RuleRegistry::household_individual())
    }
}

async fn update_main_pb_message(pb: &ProgressBar, phase: &str, progress_config: &ProgressConfig) {
    if progress_config.should_show_memory() {
        let memory_mb = get_memory_usage().await;
        pb.set_message(format!("{} (Memory: {} MB)", phase, memory_mb));
    } else {
        pb.set_message(phase.to_string());
    }
}

async fn run_command(args: RunArgs, mut config: DedupeConfig, min_year: i32) -> Result<()> {
    if let Some(threshold) = args.group_threshold {
        config.group_threshold = threshold;
    }
    if let Some(partitions) = args.spill_partitions {
        config.spill_partitions = partitions;
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrent_rules = concurrency.max(1);
    }
    config.write_contacts |= args.write_contacts;
    config.log_config();

    let registry = load_registry(&args.registry, &config)?;
    let rules = registry.select(&args.rules, &args.prefix)?;
    if rules.is_empty() {
        bail!("No rule selected");
    }

    let progress_config = ProgressConfig::from_env();
    let multi_progress = progress_config.create_multi_progress();
    let phases = if args.analyze { 5 } else { 4 };
    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(phases));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb
    });

    let run_id = Uuid::new_v4().to_string();
    let start = Instant::now();
    info!("Starting deduplication run {} with {} rules", run_id, rules.len());

    // Phase 1: normalized base
    if let Some(pb) = &main_pb {
        update_main_pb_message(pb, "Phase 1: Loading normalized base", &progress_config).await;
    }
    let records = load_normalized_base(&config.normalized_base)?;
    if let Some(pb) = &main_pb {
        pb.inc(1);
    }

    // Phase 2: known duplicates
    if let Some(pb) = &main_pb {
        update_main_pb_message(pb, "Phase 2: Loading known duplicates", &progress_config).await;
    }
    let known_pairs = load_known_pairs(&config.doublons_file)?;
    if let Some(pb) = &main_pb {
        pb.inc(1);
    }

    // Phase 3: rules
    if let Some(pb) = &main_pb {
        update_main_pb_message(pb, "Phase 3: Running rules", &progress_config).await;
    }
    let records = Arc::new(records);
    let inputs = RuleBatchInputs {
        records: records.clone(),
        known_pairs: Arc::new(known_pairs),
        options: GroupingOptions::with_threshold(config.group_threshold).with_partitions(config.spill_partitions),
    };
    let report = run_rules(
        &run_id,
        rules.clone(),
        inputs,
        config.max_concurrent_rules,
        multi_progress.clone(),
    )
    .await;
    if let Some(pb) = &main_pb {
        pb.inc(1);
    }

    // Phase 4: outputs of the rules that succeeded
    if let Some(pb) = &main_pb {
        update_main_pb_message(pb, "Phase 4: Writing rule outputs", &progress_config).await;
    }
    let writer = RuleOutputWriter::for_today(&config.out_dir);
    for output in &report.outputs {
        writer.write(output)?;
        if config.write_contacts {
            if let Some(rule) = rules.iter().find(|r| r.id == output.rule_id) {
                writer.write_contacts(rule, &records)?;
            }
        }
    }
    if let Some(pb) = &main_pb {
        pb.inc(1);
    }

    if args.analyze {
        if let Some(pb) = &main_pb {
            update_main_pb_message(pb, "Phase 5: Cross-rule analysis", &progress_config).await;
        }
        if !report.is_success() {
            warn!("⚠️  Cross-rule analysis only covers the rules that succeeded");
        }
        let options = AnalysisOptions {
            analysis_dir: config.analysis_dir.clone(),
            min_year,
            min_rules: args.min_rules,
        };
        analyze(&report, &options)?;
        if let Some(pb) = &main_pb {
            pb.inc(1);
        }
    }

    if let Some(pb) = &main_pb {
        pb.finish_with_message(format!("Run {} finished in {:.2?}", run_id, start.elapsed()));
    }

    if !report.is_success() {
        for failure in &report.failures {
            error!("Rule {} failed: {}", failure.rule_id, failure.error);
        }
        bail!("{} of {} rules failed", report.failures.len(), rules.len());
    }
    info!("✅ Run {} completed in {:.2?}", run_id, start.elapsed());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    load_env();

    let cli = Cli::parse();
    let mut config = DedupeConfig::from_env();
    if let Some(dir) = cli.out_dir {
        config.out_dir = dir;
    }
    if let Some(dir) = cli.analysis_dir {
        config.analysis_dir = dir;
    }
    let min_year = cli.min_year.unwrap_or(config.min_year);
    let analysis_options = |min_rules: usize| AnalysisOptions {
        analysis_dir: config.analysis_dir.clone(),
        min_year,
        min_rules,
    };

    match cli.command {
        Command::Normalize { input, output } => {
            let input = input.unwrap_or_else(|| config.contacts_file.clone());
            let output = output.unwrap_or_else(|| config.normalized_base.clone());
            let stats = tokio::task::spawn_blocking(move || normalize_contacts_to_base(&input, &output))
                .await
                .context("Normalization worker panicked")??;
            info!("Normalization done: {} contacts written", stats.rows_written);
        }
        Command::Run(args) => run_command(args, config.clone(), min_year).await?,
        Command::ByYear => {
            let source = NewPairsDirectory::new(&config.out_dir);
            write_yearly_counts(&source, &analysis_options(1))?;
        }
        Command::Cross => {
            let source = NewPairsDirectory::new(&config.out_dir);
            let records = write_cross_table(&source, &analysis_options(1))?;
            info!("{} unique consolidated pairs", records.len());
        }
        Command::Summary { min_rules } => {
            write_summary_from_cross_table(&analysis_options(min_rules))?;
        }
        Command::Analyze { min_rules } => {
            let source = NewPairsDirectory::new(&config.out_dir);
            analyze(&source, &analysis_options(min_rules))?;
        }
        Command::ListRules(args) => {
            let registry = load_registry(&args, &config)?;
            for rule in registry.rules() {
                let codes: Vec<&str> = rule.fields.iter().map(|f| f.code()).collect();
                println!("{:<4} {:<60} {}", rule.id, rule.label, codes.join(" + "));
            }
        }
    }
    Ok(())
}
