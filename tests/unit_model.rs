// Unit tests for the topic model estimator over synthetic corpora.
//
// Two planted themes with disjoint vocabularies and demographics that
// track the themes, so the sampler should separate them, and the
// invariants (simplex rows, alignment, reproducibility) must hold
// regardless of how well it does.

use mangrove::corpus::covariates::Metadata;
use mangrove::corpus::schema::Submission;
use mangrove::model::stm::{fit, Init, StmOptions};
use mangrove::model::PrevalenceFormula;
use mangrove::text::dtm::Corpus;
use mangrove::text::preprocess::{Language, Preprocessor};

fn submission(uf: &str) -> Submission {
    Submission {
        suggestion: String::new(),
        catalog: String::new(),
        uf: Some(uf.to_string()),
        sex: None,
        residence: None,
        education: None,
        age: None,
        marital: None,
        activity: None,
        date: None,
    }
}

/// 20 documents: half about conservation (mostly from SP), half about
/// fiscal policy (mostly from RJ).
fn planted_corpus() -> Corpus {
    let mut texts = Vec::new();
    let mut subs = Vec::new();
    for i in 0..10 {
        texts.push("forest rivers wildlife wetlands forest rivers".to_string());
        subs.push(submission(if i < 8 { "SP" } else { "RJ" }));
    }
    for i in 0..10 {
        texts.push("taxes budget spending revenue taxes budget".to_string());
        subs.push(submission(if i < 8 { "RJ" } else { "SP" }));
    }
    let meta = Metadata::from_submissions(&subs, &[]);
    let pre = Preprocessor::new(Language::English, &[]);
    Corpus::build(&texts, meta, &pre).unwrap().prune(2).unwrap()
}

fn options(k: usize, seed: u64) -> StmOptions {
    StmOptions {
        num_topics: k,
        max_iters: 100,
        init: Init::Seeded(seed),
        ..StmOptions::default()
    }
}

#[test]
fn theta_is_a_simplex_per_document() {
    let corpus = planted_corpus();
    let formula = PrevalenceFormula::parse("~ uf").unwrap();
    let model = fit(&corpus, &formula, &options(2, 11)).unwrap();

    assert_eq!(model.theta().len(), corpus.docs.len());
    for row in model.theta() {
        assert_eq!(row.len(), 2);
        let sum: f64 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(row.iter().all(|&p| p > 0.0));
    }
}

#[test]
fn phi_is_a_simplex_per_topic() {
    let corpus = planted_corpus();
    let formula = PrevalenceFormula::parse("~ uf").unwrap();
    let model = fit(&corpus, &formula, &options(2, 11)).unwrap();

    assert_eq!(model.phi().len(), 2);
    for row in model.phi() {
        assert_eq!(row.len(), corpus.vocab.len());
        let sum: f64 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}

#[test]
fn planted_themes_separate() {
    let corpus = planted_corpus();
    let formula = PrevalenceFormula::parse("~ uf").unwrap();
    let model = fit(&corpus, &formula, &options(2, 11)).unwrap();

    // Document 0 is pure conservation text, document 10 pure fiscal.
    // Whatever topic ids they land on, they should be different and
    // strongly assigned.
    let dominant = |d: usize| -> usize {
        let row = &model.theta()[d];
        (0..row.len()).max_by(|&a, &b| row[a].total_cmp(&row[b])).unwrap()
    };
    assert_ne!(dominant(0), dominant(10), "planted themes collapsed into one topic");
    assert!(model.theta()[0][dominant(0)] > 0.7);
    assert!(model.theta()[10][dominant(10)] > 0.7);
}

#[test]
fn same_seed_same_fit_different_seed_may_differ() {
    let corpus = planted_corpus();
    let formula = PrevalenceFormula::parse("~ uf").unwrap();

    let a = fit(&corpus, &formula, &options(2, 42)).unwrap();
    let b = fit(&corpus, &formula, &options(2, 42)).unwrap();
    assert_eq!(a.theta(), b.theta());
    assert_eq!(a.log_likelihood, b.log_likelihood);
}

#[test]
fn convergence_flag_matches_trace_length() {
    let corpus = planted_corpus();
    let formula = PrevalenceFormula::parse("~ uf").unwrap();
    let model = fit(&corpus, &formula, &options(2, 11)).unwrap();

    assert_eq!(model.iterations, model.log_likelihood.len());
    if model.converged {
        assert!(model.iterations <= 100);
    } else {
        assert_eq!(model.iterations, 100);
    }
}

#[test]
fn multi_covariate_formula_is_accepted() {
    let corpus = planted_corpus();
    let formula = PrevalenceFormula::parse("~ uf + sex").unwrap();
    // "sex" is all-unknown here: one level, one profile per uf cell
    let model = fit(&corpus, &formula, &options(2, 5)).unwrap();
    assert_eq!(model.theta().len(), corpus.docs.len());
}

#[test]
fn more_topics_than_documents_still_fits() {
    let corpus = planted_corpus();
    let formula = PrevalenceFormula::parse("~ uf").unwrap();
    let model = fit(&corpus, &formula, &options(25, 5)).unwrap();
    assert_eq!(model.num_topics, 25);
    for row in model.theta() {
        let sum: f64 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
