// The full analysis run, one stage at a time.
//
// Each stage consumes the previous stage's output and produces a new
// artifact; nothing is mutated across stage boundaries, and alignment
// between documents and metadata is re-checked wherever rows can drop.

use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::corpus::covariates::Metadata;
use crate::corpus::filter::KeywordFilter;
use crate::corpus::loader::read_submissions;
use crate::error::Result;
use crate::model::effects::{estimate, EffectOptions, EffectsTable};
use crate::model::stm::{fit, FittedModel, Init, StmOptions};
use crate::model::PrevalenceFormula;
use crate::text::dtm::Corpus;
use crate::text::preprocess::Preprocessor;

/// Counts collected while preparing the corpus, for `inspect` and the
/// run header.
#[derive(Debug, Clone)]
pub struct CorpusStats {
    pub rows_read: usize,
    pub rows_matched: usize,
    pub empty_documents: usize,
    pub documents: usize,
    pub vocabulary: usize,
    pub tokens: usize,
}

impl CorpusStats {
    /// Print the stats plus the covariate level tables.
    pub fn display(&self, corpus: &Corpus) {
        println!("\n{}", "=== Corpus ===".bold());
        println!("  Rows read:          {}", self.rows_read);
        println!("  Keyword matches:    {}", self.rows_matched);
        println!("  Empty after prep:   {}", self.empty_documents);
        println!("  Modeled documents:  {}", self.documents);
        println!("  Vocabulary terms:   {}", self.vocabulary);
        println!("  Tokens:             {}", self.tokens);

        println!("\n{}", "=== Covariates ===".bold());
        for column in corpus.meta.columns() {
            let counts = column.level_counts();
            let mut levels: Vec<(&String, usize)> =
                column.levels().iter().zip(counts).collect();
            levels.sort_by(|a, b| b.1.cmp(&a.1));

            let preview = levels
                .iter()
                .take(8)
                .map(|(level, count)| format!("{level} ({count})"))
                .collect::<Vec<_>>()
                .join(", ");
            let suffix = if levels.len() > 8 {
                format!(", ... {} levels total", levels.len())
            } else {
                String::new()
            };
            println!(
                "  {:<12} ref={}  {}{}",
                column.name(),
                column.reference().bold(),
                preview.dimmed(),
                suffix.dimmed()
            );
        }
        println!();
    }
}

/// Everything a full run produces.
pub struct RunOutput {
    pub corpus: Corpus,
    pub stats: CorpusStats,
    pub model: FittedModel,
    pub effects: EffectsTable,
}

/// One point of the K-selection sweep.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepPoint {
    pub num_topics: usize,
    pub iterations: usize,
    pub converged: bool,
    pub log_likelihood: f64,
}

/// Stages 1-5: load, filter, normalize, preprocess, prune.
/// Shared by `run` and `inspect`.
pub fn prepare(config: &Config) -> Result<(Corpus, CorpusStats)> {
    config.validate()?;

    // Stage 1: load the export into typed submissions
    let submissions = read_submissions(&config.corpus_path, &config.encoding, &config.columns)?;
    let rows_read = submissions.len();

    // Stage 2: keep the environmental-policy subset
    let filter = KeywordFilter::new(&config.keywords, config.filter_fields)?;
    let submissions = filter.apply(submissions)?;
    let rows_matched = submissions.len();

    // Stage 3: normalize demographic covariates
    let meta = Metadata::from_submissions(&submissions, &config.references);

    // Stage 4: preprocess free text into the document-term corpus
    let preprocessor = Preprocessor::new(config.language, &config.extra_stopwords);
    let texts: Vec<String> = submissions.into_iter().map(|s| s.suggestion).collect();
    let corpus = Corpus::build(&texts, meta, &preprocessor)?;
    let empty_documents = corpus.empty_documents().len();

    // Stage 5: prune rare terms, dropping emptied documents with their
    // metadata rows
    let corpus = corpus.prune(config.min_doc_freq)?;

    let stats = CorpusStats {
        rows_read,
        rows_matched,
        empty_documents,
        documents: corpus.docs.len(),
        vocabulary: corpus.vocab.len(),
        tokens: corpus.token_count(),
    };
    Ok((corpus, stats))
}

/// The full pipeline: prepare, fit, estimate effects.
pub fn run(config: &Config) -> Result<RunOutput> {
    let (corpus, stats) = prepare(config)?;
    let formula = PrevalenceFormula::parse(&config.prevalence)?;

    // Stage 6: fit the topic model
    let model = fit(&corpus, &formula, &stm_options(config, config.num_topics, true))?;

    // Stage 7: regress topic prevalence on the covariates
    let effects = estimate(&model, &corpus.meta, &formula, &effect_options(config))?;

    Ok(RunOutput {
        corpus,
        stats,
        model,
        effects,
    })
}

/// Model selection: fit each candidate K over the same prepared corpus
/// and report how the fits compare. A parameter sweep around the
/// pipeline, not part of it.
pub fn sweep(config: &Config, candidates: &[usize]) -> Result<Vec<SweepPoint>> {
    let (corpus, stats) = prepare(config)?;
    let formula = PrevalenceFormula::parse(&config.prevalence)?;
    info!(
        documents = stats.documents,
        candidates = candidates.len(),
        "sweeping topic counts"
    );

    let mut points = Vec::with_capacity(candidates.len());
    for &k in candidates {
        println!("Fitting K = {k}...");
        let model = fit(&corpus, &formula, &stm_options(config, k, true))?;
        points.push(SweepPoint {
            num_topics: k,
            iterations: model.iterations,
            converged: model.converged,
            log_likelihood: model.log_likelihood.last().copied().unwrap_or(f64::NAN),
        });
    }
    Ok(points)
}

fn stm_options(config: &Config, num_topics: usize, show_progress: bool) -> StmOptions {
    StmOptions {
        num_topics,
        max_iters: config.max_iters,
        tolerance: config.tolerance,
        init: match config.seed {
            Some(seed) => Init::Seeded(seed),
            None => Init::Entropy,
        },
        show_progress,
        ..StmOptions::default()
    }
}

fn effect_options(config: &Config) -> EffectOptions {
    EffectOptions {
        uncertainty: config.uncertainty,
        bootstrap_reps: config.bootstrap_reps,
        seed: config.seed,
    }
}
