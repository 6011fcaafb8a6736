use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

use lookout::config::Config;
use lookout::flow::EntityAggregates;
use lookout::ml::{score_table, FeatureTable};
use lookout::outliers::{OutlierSet, OutlierSource};
use lookout::report::{TrialLog, TrialReport};
use lookout::select::Algorithm;
use lookout::{LookOut, RunSummary};

#[derive(Parser)]
#[command(name = "lookout")]
#[command(author, version, about = "Explain outliers with a small budget of feature-pair plots")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score entities, pick outliers, and select explaining plots
    Run {
        /// Flow log (delimited text with a header line)
        datafile: PathBuf,

        /// Outlier set sizes (repeatable)
        #[arg(short = 'n', long = "num-outliers")]
        num_outliers: Vec<usize>,

        /// Plot budgets (repeatable)
        #[arg(short, long = "budget")]
        budgets: Vec<usize>,

        /// Rank weight exponent
        #[arg(short, long)]
        p_val: Option<f64>,

        /// Selection algorithms (repeatable)
        #[arg(short, long = "algorithm", value_enum)]
        algorithms: Vec<Algorithm>,

        /// Also run the TopK baseline
        #[arg(long)]
        baselines: bool,

        /// Where the outlier set comes from
        #[arg(long, value_enum)]
        source: Option<OutlierSource>,

        /// Outlier ids when the source is `dictated` (repeatable)
        #[arg(long = "outlier")]
        dictated: Vec<String>,

        /// Isolation forest seed
        #[arg(long)]
        seed: Option<u64>,

        /// Field delimiter of the data file
        #[arg(long)]
        delimiter: Option<char>,

        /// Do not write the log file or JSON reports
        #[arg(long)]
        dry_run: bool,

        /// Output format (table, json, simple)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Print the most anomalous entities of a data file
    Score {
        datafile: PathBuf,

        /// Number of entities to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Isolation forest seed
        #[arg(long)]
        seed: Option<u64>,

        /// Field delimiter of the data file
        #[arg(long)]
        delimiter: Option<char>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate default configuration
    GenConfig {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Table row for trial results
#[derive(Tabled)]
struct TrialRow {
    #[tabled(rename = "N")]
    num_outliers: usize,
    #[tabled(rename = "Budget")]
    budget: usize,
    #[tabled(rename = "Algorithm")]
    algorithm: String,
    #[tabled(rename = "Time (s)")]
    time: String,
    #[tabled(rename = "Coverage")]
    coverage: String,
    #[tabled(rename = "Plots")]
    plots: String,
}

/// Table row for entity scores
#[derive(Tabled)]
struct ScoreRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Entity")]
    id: String,
    #[tabled(rename = "Score")]
    score: String,
}

pub fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Run {
            datafile,
            num_outliers,
            budgets,
            p_val,
            algorithms,
            baselines,
            source,
            dictated,
            seed,
            delimiter,
            dry_run,
            format,
        } => {
            let mut config = config;
            let selection = &mut config.selection;
            if !num_outliers.is_empty() {
                selection.num_outliers = num_outliers;
            }
            if !budgets.is_empty() {
                selection.budgets = budgets;
            }
            if let Some(p) = p_val {
                selection.p_val = p;
            }
            if !algorithms.is_empty() {
                selection.algorithms = algorithms;
            }
            selection.baselines |= baselines;
            if let Some(source) = source {
                config.outliers.source = source;
            }
            if !dictated.is_empty() {
                config.outliers.dictated = dictated;
            }
            apply_data_overrides(&mut config, seed, delimiter);
            cmd_run(config, datafile, dry_run, format)
        }
        Commands::Score {
            datafile,
            top,
            seed,
            delimiter,
            json,
        } => {
            let mut config = config;
            apply_data_overrides(&mut config, seed, delimiter);
            cmd_score(config, datafile, top, json)
        }
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

fn apply_data_overrides(config: &mut Config, seed: Option<u64>, delimiter: Option<char>) {
    if let Some(seed) = seed {
        config.scoring.seed = seed;
    }
    if let Some(delimiter) = delimiter {
        config.data.delimiter = delimiter;
    }
}

fn cmd_run(config: Config, datafile: PathBuf, dry_run: bool, format: String) -> Result<()> {
    let log_path = config.log_path();
    let report_dir = config.report_dir();

    let lookout = LookOut::new(config).context("Invalid configuration")?;
    let records = lookout
        .load_flows(&datafile)
        .with_context(|| format!("Failed to read data file: {}", datafile.display()))?;
    let workspace = lookout.prepare(&records)?;
    let summary = lookout.run_trials(&workspace)?;

    if !dry_run {
        write_outputs(&summary, &log_path, &report_dir)?;
    }

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary.trials)?);
        }
        "simple" => {
            for trial in &summary.trials {
                println!("{}", trial.record.log_line());
            }
        }
        _ => print_summary(&summary),
    }

    Ok(())
}

fn write_outputs(summary: &RunSummary, log_path: &Path, report_dir: &Path) -> Result<()> {
    let mut log = TrialLog::create(log_path)
        .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;
    for trial in &summary.trials {
        log.append(&trial.record)?;
        trial
            .save(report_dir)
            .with_context(|| format!("Failed to write report to {}", report_dir.display()))?;
    }
    log.finish()?;

    println!(
        "{} {} ({} reports in {})",
        "Log written to".green().bold(),
        log_path.display(),
        summary.trials.len(),
        report_dir.display()
    );
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{}",
        format!(
            "=== LookOut: {} entities, {} candidate plots ===",
            summary.entities, summary.plots
        )
        .bold()
    );

    let rows: Vec<TrialRow> = summary
        .trials
        .iter()
        .map(|t| TrialRow {
            num_outliers: t.record.num_outliers,
            budget: t.record.budget,
            algorithm: t.record.algorithm.to_string(),
            time: format!("{:.6}", t.record.elapsed.as_secs_f64()),
            coverage: t.record.coverage.to_string(),
            plots: plot_list(t),
        })
        .collect();
    println!("{}", Table::new(rows));

    if summary.failed > 0 {
        println!(
            "{} {} trial(s) failed, see log output",
            "Warning:".yellow().bold(),
            summary.failed
        );
    }
}

fn plot_list(trial: &TrialReport) -> String {
    trial
        .plots
        .iter()
        .map(|p| format!("{}:{}", p.y, p.x))
        .collect::<Vec<_>>()
        .join(", ")
}

fn cmd_score(config: Config, datafile: PathBuf, top: usize, json: bool) -> Result<()> {
    let lookout = LookOut::new(config).context("Invalid configuration")?;
    let records = lookout
        .load_flows(&datafile)
        .with_context(|| format!("Failed to read data file: {}", datafile.display()))?;
    let table = FeatureTable::from_aggregates(
        lookout.config().catalog.clone(),
        &EntityAggregates::from_records(&records),
    )?;
    let scores = score_table(&table, &lookout.config().scoring)?;
    let ranked = OutlierSet::top_n(table.ids(), &scores, top)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }

    let rows: Vec<ScoreRow> = ranked
        .ids()
        .iter()
        .zip(ranked.scores())
        .enumerate()
        .map(|(i, (id, score))| ScoreRow {
            rank: i + 1,
            id: id.clone(),
            score: format!("{:.4}", score),
        })
        .collect();
    println!("{}", Table::new(rows));

    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = Config::default();
    let toml_str = toml::to_string_pretty(&config)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &toml_str)?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            println!("{}", toml_str);
        }
    }

    Ok(())
}
