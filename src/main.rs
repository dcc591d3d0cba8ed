use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use mangrove::config::{ChartSpec, Config, RunProfile, Uncertainty};
use mangrove::model::effects::EffectsTable;
use mangrove::pipeline::run as pipeline;
use mangrove::report;

/// Mangrove: covariate-aware topic modeling of citizen submissions to a
/// constitutional assembly.
///
/// Filters a legacy submission export to an environmental-policy subset,
/// fits a topic model whose prevalence responds to demographic
/// covariates, and charts per-topic covariate effects.
#[derive(Parser)]
#[command(name = "mangrove", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Parameter overrides shared by the corpus-consuming subcommands.
#[derive(clap::Args)]
struct CommonArgs {
    /// Which of the two original analysis variants to start from
    #[arg(long, value_enum, default_value = "broad")]
    profile: RunProfile,

    /// Path to the semicolon-delimited corpus export
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Comma-separated keyword list replacing the profile default
    #[arg(long, value_delimiter = ',')]
    keywords: Vec<String>,

    /// Minimum number of documents a term must appear in
    #[arg(long)]
    min_doc_freq: Option<usize>,

    /// Prevalence formula, e.g. "~ uf + sex + education"
    #[arg(long)]
    prevalence: Option<String>,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and render the configured charts
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of topics K (overrides the profile default)
        #[arg(long)]
        topics: Option<usize>,

        /// Gibbs sweep cap
        #[arg(long)]
        max_iters: Option<usize>,

        /// Standard-error mode for the effect estimator
        #[arg(long, value_enum)]
        uncertainty: Option<Uncertainty>,

        /// Chart selection as topic:covariate, repeatable (e.g. -c 3:uf)
        #[arg(long = "chart", short = 'c')]
        charts: Vec<String>,

        /// Top terms to list per topic
        #[arg(long, default_value = "8")]
        top_terms: usize,

        /// Write the effects table as JSON
        #[arg(long)]
        effects_out: Option<PathBuf>,

        /// Write the fit summary as JSON
        #[arg(long)]
        model_out: Option<PathBuf>,
    },

    /// Load, filter and preprocess only; print corpus statistics
    Inspect {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Fit several topic counts and compare the fits
    Sweep {
        #[command(flatten)]
        common: CommonArgs,

        /// Candidate topic counts
        #[arg(long, value_delimiter = ',', default_value = "10,15,20")]
        topics: Vec<usize>,
    },

    /// Re-render charts from a saved effects JSON, without refitting
    Chart {
        /// Path to an effects table written by `run --effects-out`
        #[arg(long)]
        effects: PathBuf,

        /// 1-based topic index
        #[arg(long)]
        topic: usize,

        /// Covariate whose level effects to plot
        #[arg(long)]
        covariate: String,
    },
}

fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mangrove=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            common,
            topics,
            max_iters,
            uncertainty,
            charts,
            top_terms,
            effects_out,
            model_out,
        } => {
            let mut config = build_config(&common)?;
            if let Some(k) = topics {
                config.num_topics = k;
            }
            if let Some(cap) = max_iters {
                config.max_iters = cap;
            }
            if let Some(mode) = uncertainty {
                config.uncertainty = mode;
            }
            if !charts.is_empty() {
                config.charts = charts
                    .iter()
                    .map(|raw| parse_chart_spec(raw))
                    .collect::<Result<_>>()?;
            }

            println!(
                "Analyzing {} (K = {})...",
                config.corpus_path.display(),
                config.num_topics
            );
            let output = pipeline::run(&config)?;

            output.stats.display(&output.corpus);
            report::topics::display_topics(&output.model, top_terms);
            if !output.model.converged {
                println!(
                    "{}",
                    format!(
                        "Note: sampler stopped at the {}-sweep cap without converging.",
                        output.model.iterations
                    )
                    .yellow()
                );
            }

            for spec in &config.charts {
                report::chart::render(&output.effects, spec.topic, &spec.covariate)?;
            }

            if let Some(path) = effects_out {
                write_json(&path, &output.effects)?;
                println!("Effects table written to {}", path.display());
            }
            if let Some(path) = model_out {
                write_json(&path, &output.model.summary(top_terms))?;
                println!("Model summary written to {}", path.display());
            }
        }

        Commands::Inspect { common } => {
            let config = build_config(&common)?;
            println!("Inspecting {}...", config.corpus_path.display());
            let (corpus, stats) = pipeline::prepare(&config)?;
            stats.display(&corpus);
        }

        Commands::Sweep { common, topics } => {
            let config = build_config(&common)?;
            let points = pipeline::sweep(&config, &topics)?;

            println!("\n{}", "=== Topic count sweep ===".bold());
            println!(
                "  {:>4}  {:>10}  {:>9}  {:>14}",
                "K".dimmed(),
                "sweeps".dimmed(),
                "converged".dimmed(),
                "log-likelihood".dimmed(),
            );
            for point in &points {
                println!(
                    "  {:>4}  {:>10}  {:>9}  {:>14.1}",
                    point.num_topics,
                    point.iterations,
                    if point.converged { "yes" } else { "no" },
                    point.log_likelihood,
                );
            }
            println!();
        }

        Commands::Chart {
            effects,
            topic,
            covariate,
        } => {
            let json = fs::read_to_string(&effects)
                .with_context(|| format!("cannot read effects table {}", effects.display()))?;
            let table: EffectsTable = serde_json::from_str(&json)
                .with_context(|| format!("{} is not an effects table", effects.display()))?;
            info!(
                topics = table.num_topics,
                rows = table.rows.len(),
                "effects table loaded"
            );
            report::chart::render(&table, topic, &covariate)?;
        }
    }

    Ok(())
}

/// Profile defaults + environment + shared CLI overrides.
fn build_config(common: &CommonArgs) -> Result<Config> {
    let mut config = Config::load(common.profile)?;
    if let Some(path) = &common.corpus {
        config.corpus_path = path.clone();
    }
    if !common.keywords.is_empty() {
        config.keywords = common.keywords.clone();
    }
    if let Some(threshold) = common.min_doc_freq {
        config.min_doc_freq = threshold;
    }
    if let Some(formula) = &common.prevalence {
        config.prevalence = formula.clone();
    }
    if let Some(seed) = common.seed {
        config.seed = Some(seed);
    }
    config.validate()?;
    Ok(config)
}

/// Parse a `topic:covariate` chart selection.
fn parse_chart_spec(raw: &str) -> Result<ChartSpec> {
    let (topic, covariate) = raw
        .split_once(':')
        .with_context(|| format!("chart spec '{raw}' is not topic:covariate"))?;
    Ok(ChartSpec {
        topic: topic
            .trim()
            .parse()
            .with_context(|| format!("chart spec '{raw}' has a non-numeric topic"))?,
        covariate: covariate.trim().to_string(),
    })
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
