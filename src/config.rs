use std::env;
use std::path::PathBuf;

use clap::ValueEnum;

use crate::corpus::schema::ColumnMap;
use crate::error::{PipelineError, Result};
use crate::text::preprocess::Language;

/// Which of the two original analysis variants to run.
///
/// The source analysis existed as two divergent runs that were never
/// reconciled: one casts a wide net over both text fields with K = 15,
/// the other filters on the catalog field alone with K = 20. They are
/// kept as named presets rather than merged; every field can still be
/// overridden individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunProfile {
    /// Match keywords against catalog OR suggestion text, K = 15
    Broad,
    /// Match keywords against catalog text only, K = 20
    Strict,
}

/// Which record fields the keyword filter searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterFields {
    CatalogOnly,
    CatalogAndSuggestion,
}

/// How the effect estimator derives standard errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Uncertainty {
    /// Classical OLS standard errors
    Analytic,
    /// Nonparametric bootstrap over documents (seeded)
    Bootstrap,
}

/// One comparison chart to render after a fit: a topic index (1-based)
/// and the covariate whose level effects to plot.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub topic: usize,
    pub covariate: String,
}

/// Central configuration for one analysis run.
///
/// Assembled in three layers: profile defaults, then environment
/// variables (a `.env` file is honored), then CLI flags. Nothing the
/// pipeline consumes is hard-coded past this point.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the semicolon-delimited corpus export
    pub corpus_path: PathBuf,
    /// Label of the legacy single-byte encoding the export uses
    pub encoding: String,
    /// Column names of the export file
    pub columns: ColumnMap,
    /// Corpus language (stopword list and stemming rules)
    pub language: Language,
    /// Keywords defining the environmental-policy subset
    pub keywords: Vec<String>,
    /// Which text fields the keyword filter searches
    pub filter_fields: FilterFields,
    /// Corpus-specific stopwords removed on top of the language list
    pub extra_stopwords: Vec<String>,
    /// Minimum number of documents a term must appear in to survive pruning
    pub min_doc_freq: usize,
    /// Number of topics K
    pub num_topics: usize,
    /// Prevalence formula, e.g. "~ uf + sex + education"
    pub prevalence: String,
    /// Reference level per covariate, e.g. uf -> SP. Covariates without
    /// an entry use their first observed level as reference.
    pub references: Vec<(String, String)>,
    /// Gibbs sweep cap
    pub max_iters: usize,
    /// Relative log-likelihood change below which the sampler stops early
    pub tolerance: f64,
    /// RNG seed; None draws one from entropy
    pub seed: Option<u64>,
    /// Standard-error mode for the effect estimator
    pub uncertainty: Uncertainty,
    /// Bootstrap replicate count (used when uncertainty = bootstrap)
    pub bootstrap_reps: usize,
    /// Charts to render after the fit
    pub charts: Vec<ChartSpec>,
}

impl Config {
    /// Build a config from profile defaults plus environment overrides.
    pub fn load(profile: RunProfile) -> Result<Self> {
        let mut config = Self::for_profile(profile);
        config.apply_env()?;
        Ok(config)
    }

    /// The built-in defaults for a profile. These reproduce the two
    /// original runs of the analysis.
    pub fn for_profile(profile: RunProfile) -> Self {
        let (filter_fields, num_topics) = match profile {
            RunProfile::Broad => (FilterFields::CatalogAndSuggestion, 15),
            RunProfile::Strict => (FilterFields::CatalogOnly, 20),
        };

        Self {
            corpus_path: PathBuf::from("data/submissions.csv"),
            encoding: "latin1".to_string(),
            columns: ColumnMap::default(),
            language: Language::Portuguese,
            keywords: vec![
                "flora".to_string(),
                "fauna".to_string(),
                "meio ambiente".to_string(),
                "ecologia".to_string(),
                "desmatamento".to_string(),
                "reflorestamento".to_string(),
                "poluição".to_string(),
            ],
            filter_fields,
            extra_stopwords: vec![
                // Boilerplate every submission letter carries
                "constituinte".to_string(),
                "constituição".to_string(),
                "assembleia".to_string(),
                "sugestão".to_string(),
                "sugere".to_string(),
                "deve".to_string(),
                "ser".to_string(),
            ],
            min_doc_freq: 5,
            num_topics,
            prevalence: "~ uf + sex + education + age".to_string(),
            references: vec![("uf".to_string(), "SP".to_string())],
            max_iters: 500,
            tolerance: 1e-4,
            seed: Some(1987),
            uncertainty: Uncertainty::Analytic,
            bootstrap_reps: 200,
            charts: vec![
                ChartSpec {
                    topic: 3,
                    covariate: "uf".to_string(),
                },
                ChartSpec {
                    topic: 3,
                    covariate: "education".to_string(),
                },
            ],
        }
    }

    /// Apply environment-variable overrides on top of the defaults.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = env::var("MANGROVE_CORPUS") {
            self.corpus_path = PathBuf::from(path);
        }
        if let Ok(encoding) = env::var("MANGROVE_ENCODING") {
            self.encoding = encoding;
        }
        if let Ok(keywords) = env::var("MANGROVE_KEYWORDS") {
            self.keywords = split_list(&keywords);
        }
        if let Ok(stopwords) = env::var("MANGROVE_EXTRA_STOPWORDS") {
            self.extra_stopwords = split_list(&stopwords);
        }
        if let Ok(value) = env::var("MANGROVE_MIN_DOC_FREQ") {
            self.min_doc_freq = parse_env("MANGROVE_MIN_DOC_FREQ", &value)?;
        }
        if let Ok(value) = env::var("MANGROVE_TOPICS") {
            self.num_topics = parse_env("MANGROVE_TOPICS", &value)?;
        }
        if let Ok(formula) = env::var("MANGROVE_PREVALENCE") {
            self.prevalence = formula;
        }
        if let Ok(value) = env::var("MANGROVE_MAX_ITERS") {
            self.max_iters = parse_env("MANGROVE_MAX_ITERS", &value)?;
        }
        if let Ok(value) = env::var("MANGROVE_SEED") {
            self.seed = Some(parse_env("MANGROVE_SEED", &value)?);
        }
        Ok(())
    }

    /// Reject parameter combinations the pipeline cannot run with.
    /// Called once, before the first stage touches the corpus.
    pub fn validate(&self) -> Result<()> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(PipelineError::config(
                "keyword list is empty; the filter would discard the whole corpus",
            ));
        }
        if self.num_topics == 0 {
            return Err(PipelineError::config("topic count K must be positive"));
        }
        if self.min_doc_freq == 0 {
            return Err(PipelineError::config(
                "minimum document frequency must be at least 1",
            ));
        }
        if self.max_iters == 0 {
            return Err(PipelineError::config("iteration cap must be positive"));
        }
        if self.uncertainty == Uncertainty::Bootstrap && self.bootstrap_reps == 0 {
            return Err(PipelineError::config(
                "bootstrap uncertainty needs at least 1 replicate",
            ));
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| PipelineError::config(format!("{name}: cannot parse '{value}'")))
}
