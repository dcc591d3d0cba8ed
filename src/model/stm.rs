// Covariate-aware topic model estimation by collapsed Gibbs sampling.
//
// Documents sharing a covariate profile (the combination of levels named
// in the prevalence formula) share a Dirichlet prior mean over topics,
// re-estimated from the current assignments each sweep. Covariates thus
// modulate topic prevalence during estimation, not only in the post-hoc
// regression: two letters from the same demographic cell borrow strength
// from each other, letters from different cells do not.
//
// Counts layout (ndk / nkw / nk) and the sweep structure follow the
// standard collapsed sampler; phi and theta are posterior means.

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::PrevalenceFormula;
use crate::error::{PipelineError, Result};
use crate::text::dtm::Corpus;

/// How the sampler's RNG is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// Nondeterministic, seeded from OS entropy
    Entropy,
    /// Deterministic, reproducible runs
    Seeded(u64),
}

/// Estimation options.
#[derive(Debug, Clone)]
pub struct StmOptions {
    pub num_topics: usize,
    /// Base document-topic prior mass per topic
    pub alpha: f64,
    /// Topic-word smoothing
    pub beta: f64,
    /// Sweep cap
    pub max_iters: usize,
    /// Relative log-likelihood change that counts as converged
    pub tolerance: f64,
    pub init: Init,
    /// Draw a progress bar over sweeps (off in library/test use)
    pub show_progress: bool,
}

impl Default for StmOptions {
    fn default() -> Self {
        Self {
            num_topics: 10,
            alpha: 0.1,
            beta: 0.01,
            max_iters: 500,
            tolerance: 1e-4,
            init: Init::Seeded(1987),
            show_progress: false,
        }
    }
}

/// A fitted topic model: per-topic term distributions, per-document
/// topic proportions, and the estimation trace.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub num_topics: usize,
    pub vocab: Vec<String>,
    phi: Vec<Vec<f64>>,
    theta: Vec<Vec<f64>>,
    /// Corpus log-likelihood after each sweep
    pub log_likelihood: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl FittedModel {
    /// Term distribution per topic: `phi()[k][w]` is p(term w | topic k).
    pub fn phi(&self) -> &[Vec<f64>] {
        &self.phi
    }

    /// Topic proportions per document: `theta()[d][k]` is the share of
    /// document d attributable to topic k. Rows sum to 1.
    pub fn theta(&self) -> &[Vec<f64>] {
        &self.theta
    }

    /// Top `n` terms per topic by probability.
    pub fn top_terms(&self, n: usize) -> Vec<Vec<(String, f64)>> {
        self.phi
            .iter()
            .map(|row| {
                let mut ranked: Vec<(usize, f64)> =
                    row.iter().copied().enumerate().collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                ranked
                    .into_iter()
                    .take(n)
                    .map(|(w, p)| (self.vocab[w].clone(), p))
                    .collect()
            })
            .collect()
    }

    pub fn summary(&self, top_n: usize) -> ModelSummary {
        ModelSummary {
            num_topics: self.num_topics,
            vocabulary_size: self.vocab.len(),
            documents: self.theta.len(),
            iterations: self.iterations,
            converged: self.converged,
            final_log_likelihood: self.log_likelihood.last().copied().unwrap_or(f64::NAN),
            top_terms: self.top_terms(top_n),
        }
    }
}

/// Serializable fit summary for the `--model-out` artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub num_topics: usize,
    pub vocabulary_size: usize,
    pub documents: usize,
    pub iterations: usize,
    pub converged: bool,
    pub final_log_likelihood: f64,
    pub top_terms: Vec<Vec<(String, f64)>>,
}

/// Fit the model over a pruned corpus.
///
/// Requires the pruner's post-conditions (non-empty vocabulary, no
/// empty documents, alignment); violations surface as errors rather
/// than skewed estimates. Hitting the sweep cap without converging is
/// reported as a warning, not a failure.
pub fn fit(corpus: &Corpus, formula: &PrevalenceFormula, opts: &StmOptions) -> Result<FittedModel> {
    let k = opts.num_topics;
    let v = corpus.vocab.len();
    let d = corpus.docs.len();

    if k == 0 {
        return Err(PipelineError::config("topic count K must be positive"));
    }
    if d == 0 || v == 0 {
        return Err(PipelineError::model(
            "cannot fit a topic model over an empty corpus",
        ));
    }
    if corpus.docs.iter().any(|doc| doc.is_empty()) {
        return Err(PipelineError::model(
            "corpus contains empty documents; prune before fitting",
        ));
    }
    if corpus.meta.len() != d {
        return Err(PipelineError::model(format!(
            "alignment broken: {} documents, {} metadata rows",
            d,
            corpus.meta.len()
        )));
    }
    if k > d {
        warn!(k, documents = d, "more topics than documents");
    }
    formula.validate(&corpus.meta)?;

    let (group_of, group_count) = corpus.meta.profile_ids(&formula.covariates)?;
    info!(
        k,
        documents = d,
        vocabulary = v,
        covariate_profiles = group_count,
        "fitting topic model"
    );

    let mut rng = match opts.init {
        Init::Entropy => StdRng::from_entropy(),
        Init::Seeded(seed) => StdRng::seed_from_u64(seed),
    };

    // Assignment counts: ndk[d][t], nkw[t][w], nk[t]
    let mut ndk = vec![vec![0usize; k]; d];
    let mut nkw = vec![vec![0usize; v]; k];
    let mut nk = vec![0usize; k];
    let mut z: Vec<Vec<usize>> = corpus.docs.iter().map(|doc| vec![0; doc.len()]).collect();

    for (di, doc) in corpus.docs.iter().enumerate() {
        for (pi, &w) in doc.iter().enumerate() {
            let topic = rng.gen_range(0..k);
            z[di][pi] = topic;
            ndk[di][topic] += 1;
            nkw[topic][w] += 1;
            nk[topic] += 1;
        }
    }

    // Per-profile prior means over topics, uniform until the first sweep
    let mut group_means = vec![vec![1.0 / k as f64; k]; group_count];
    let prior_mass = opts.alpha * k as f64;

    let vb = v as f64 * opts.beta;
    let mut weights = vec![0.0f64; k];
    let mut log_likelihood = Vec::with_capacity(opts.max_iters);
    let mut converged = false;
    let mut iterations = 0;

    let progress = if opts.show_progress {
        let bar = ProgressBar::new(opts.max_iters as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  Sampling [{bar:30}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(bar)
    } else {
        None
    };

    for it in 0..opts.max_iters {
        for di in 0..d {
            let prior = &group_means[group_of[di]];
            for pi in 0..corpus.docs[di].len() {
                let w = corpus.docs[di][pi];
                let old = z[di][pi];

                ndk[di][old] -= 1;
                nkw[old][w] -= 1;
                nk[old] -= 1;

                // p(t) proportional to (ndk + prior_mass*m_gt) * (nkw + beta) / (nk + V*beta)
                let mut total = 0.0;
                for t in 0..k {
                    let left = ndk[di][t] as f64 + prior_mass * prior[t];
                    let right = (nkw[t][w] as f64 + opts.beta) / (nk[t] as f64 + vb);
                    weights[t] = left * right;
                    total += weights[t];
                }

                let new = if total <= f64::EPSILON {
                    rng.gen_range(0..k)
                } else {
                    sample_index(&weights, total, &mut rng)
                };

                z[di][pi] = new;
                ndk[di][new] += 1;
                nkw[new][w] += 1;
                nk[new] += 1;
            }
        }

        update_group_means(&mut group_means, &ndk, &group_of, opts.alpha);

        let phi = compute_phi(&nkw, &nk, opts.beta);
        let theta = compute_theta(&ndk, &group_means, &group_of, prior_mass);
        let ll = corpus_log_likelihood(corpus, &theta, &phi);
        log_likelihood.push(ll);
        debug!(sweep = it + 1, log_likelihood = ll, "sweep complete");

        if let Some(bar) = &progress {
            bar.inc(1);
        }

        iterations = it + 1;
        if it > 0 {
            let prev = log_likelihood[it - 1];
            if ((ll - prev) / prev.abs()).abs() < opts.tolerance {
                converged = true;
                break;
            }
        }
    }

    if let Some(bar) = &progress {
        bar.finish_and_clear();
    }

    if converged {
        info!(iterations, "sampler converged");
    } else {
        warn!(
            iterations,
            "sampler hit the iteration cap without converging; estimates may be noisy"
        );
    }

    let phi = compute_phi(&nkw, &nk, opts.beta);
    let theta = compute_theta(&ndk, &group_means, &group_of, prior_mass);

    Ok(FittedModel {
        num_topics: k,
        vocab: corpus.vocab.clone(),
        phi,
        theta,
        log_likelihood,
        iterations,
        converged,
    })
}

/// Inverse-CDF draw from unnormalized weights.
fn sample_index(weights: &[f64], total: f64, rng: &mut StdRng) -> usize {
    let mut u = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        u -= w;
        if u <= 0.0 {
            return i;
        }
    }
    weights.len() - 1
}

/// Re-estimate each profile's prior mean from the current counts.
fn update_group_means(
    group_means: &mut [Vec<f64>],
    ndk: &[Vec<usize>],
    group_of: &[usize],
    alpha: f64,
) {
    let k = group_means[0].len();
    let mut sums = vec![vec![alpha; k]; group_means.len()];
    for (di, counts) in ndk.iter().enumerate() {
        let g = group_of[di];
        for t in 0..k {
            sums[g][t] += counts[t] as f64;
        }
    }
    for (g, sum) in sums.iter().enumerate() {
        let total: f64 = sum.iter().sum();
        for t in 0..k {
            group_means[g][t] = sum[t] / total;
        }
    }
}

/// phi[t][w] = (nkw + beta) / (nk + V*beta)
fn compute_phi(nkw: &[Vec<usize>], nk: &[usize], beta: f64) -> Vec<Vec<f64>> {
    let v = nkw[0].len();
    let vb = v as f64 * beta;
    nkw.iter()
        .zip(nk)
        .map(|(row, &total)| {
            let denom = total as f64 + vb;
            row.iter().map(|&c| (c as f64 + beta) / denom).collect()
        })
        .collect()
}

/// theta[d][t] = (ndk + prior_mass*m_gt) / (N_d + prior_mass)
fn compute_theta(
    ndk: &[Vec<usize>],
    group_means: &[Vec<f64>],
    group_of: &[usize],
    prior_mass: f64,
) -> Vec<Vec<f64>> {
    ndk.iter()
        .enumerate()
        .map(|(di, counts)| {
            let prior = &group_means[group_of[di]];
            let len: usize = counts.iter().sum();
            let denom = len as f64 + prior_mass;
            counts
                .iter()
                .zip(prior)
                .map(|(&c, &m)| (c as f64 + prior_mass * m) / denom)
                .collect()
        })
        .collect()
}

/// sum over documents and tokens of ln sum_t theta[d][t] * phi[t][w]
fn corpus_log_likelihood(corpus: &Corpus, theta: &[Vec<f64>], phi: &[Vec<f64>]) -> f64 {
    let mut ll = 0.0;
    for (di, doc) in corpus.docs.iter().enumerate() {
        for &w in doc {
            let p: f64 = theta[di]
                .iter()
                .zip(phi)
                .map(|(&t, row)| t * row[w])
                .sum();
            ll += p.max(f64::MIN_POSITIVE).ln();
        }
    }
    ll
}
