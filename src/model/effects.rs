// Effect estimation: per-topic OLS of topic prevalence on the
// dummy-encoded prevalence covariates.
//
// The design matrix is intercept + one column per observed non-reference
// level, shared across topics, so X'X is factored once and reused for
// all K regressions. The output table carries an explicit zero-estimate
// row for each reference level: callers never reconstruct encoded
// coefficient names to find the baseline.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::stm::FittedModel;
use super::PrevalenceFormula;
use crate::config::Uncertainty;
use crate::corpus::covariates::Metadata;
use crate::error::{PipelineError, Result};

/// Options for the effect estimator.
#[derive(Debug, Clone)]
pub struct EffectOptions {
    pub uncertainty: Uncertainty,
    pub bootstrap_reps: usize,
    pub seed: Option<u64>,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            uncertainty: Uncertainty::Analytic,
            bootstrap_reps: 200,
            seed: Some(1987),
        }
    }
}

/// One row of the effects table: the estimated shift in a topic's
/// prevalence for a covariate level, relative to that covariate's
/// reference level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectRow {
    /// 1-based topic index
    pub topic: usize,
    pub covariate: String,
    pub level: String,
    pub estimate: f64,
    pub std_error: f64,
    /// Reference rows carry estimate 0 and SE 0 by construction
    pub reference: bool,
}

/// The long-format effects table: exactly one row per
/// (topic, covariate, level) for topics 1..=K.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectsTable {
    pub num_topics: usize,
    pub rows: Vec<EffectRow>,
}

impl EffectsTable {
    /// Rows for one topic and covariate, reference row included.
    pub fn rows_for(&self, topic: usize, covariate: &str) -> Vec<&EffectRow> {
        self.rows
            .iter()
            .filter(|r| r.topic == topic && r.covariate == covariate)
            .collect()
    }
}

/// One dummy column: which covariate level it encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DummyColumn {
    covariate: String,
    level: String,
}

/// Regress each topic's prevalence on the formula's covariates.
pub fn estimate(
    model: &FittedModel,
    meta: &Metadata,
    formula: &PrevalenceFormula,
    opts: &EffectOptions,
) -> Result<EffectsTable> {
    let theta = model.theta();
    if theta.len() != meta.len() {
        return Err(PipelineError::model(format!(
            "alignment broken: {} documents, {} metadata rows",
            theta.len(),
            meta.len()
        )));
    }
    formula.validate(meta)?;

    let (design, columns) = build_design(meta, formula)?;
    let n = design.len();
    let p = columns.len() + 1; // + intercept
    if n <= p {
        return Err(PipelineError::model(format!(
            "{n} documents cannot support {p} regression coefficients"
        )));
    }

    let xtx_inv = invert(&normal_matrix(&design)).ok_or_else(|| {
        PipelineError::model("covariates are collinear; the design matrix is singular")
    })?;

    // Point estimates per topic from the full sample
    let mut estimates: Vec<Vec<f64>> = Vec::with_capacity(model.num_topics);
    let mut analytic_se: Vec<Vec<f64>> = Vec::with_capacity(model.num_topics);
    for k in 0..model.num_topics {
        let y: Vec<f64> = theta.iter().map(|row| row[k]).collect();
        let beta = solve_ols(&design, &y, &xtx_inv);

        let rss: f64 = design
            .iter()
            .zip(&y)
            .map(|(x, &yi)| {
                let fitted: f64 = x.iter().zip(&beta).map(|(&xj, &bj)| xj * bj).sum();
                (yi - fitted).powi(2)
            })
            .sum();
        let sigma2 = rss / (n - p) as f64;
        let se: Vec<f64> = (0..p).map(|j| (sigma2 * xtx_inv[j][j]).max(0.0).sqrt()).collect();

        estimates.push(beta);
        analytic_se.push(se);
    }

    let std_errors = match opts.uncertainty {
        Uncertainty::Analytic => analytic_se,
        Uncertainty::Bootstrap => {
            bootstrap_se(&design, theta, model.num_topics, opts)?
        }
    };

    // Assemble the long-format table: explicit reference row first, then
    // one row per estimated level, in formula order.
    let mut rows = Vec::new();
    for k in 0..model.num_topics {
        let topic = k + 1;
        for name in &formula.covariates {
            let column = meta.column(name)?;
            rows.push(EffectRow {
                topic,
                covariate: name.clone(),
                level: column.reference().to_string(),
                estimate: 0.0,
                std_error: 0.0,
                reference: true,
            });
            for (j, dummy) in columns.iter().enumerate() {
                if &dummy.covariate == name {
                    rows.push(EffectRow {
                        topic,
                        covariate: dummy.covariate.clone(),
                        level: dummy.level.clone(),
                        // +1 skips the intercept column
                        estimate: estimates[k][j + 1],
                        std_error: std_errors[k][j + 1],
                        reference: false,
                    });
                }
            }
        }
    }

    info!(
        topics = model.num_topics,
        rows = rows.len(),
        "effects estimated"
    );

    Ok(EffectsTable {
        num_topics: model.num_topics,
        rows,
    })
}

/// Build the shared design matrix: intercept + one dummy column per
/// observed non-reference level of each formula covariate. Levels that
/// no longer occur in the metadata (possible after pruning) get no
/// column, since a column of zeros would make X'X singular.
fn build_design(
    meta: &Metadata,
    formula: &PrevalenceFormula,
) -> Result<(Vec<Vec<f64>>, Vec<DummyColumn>)> {
    let mut columns: Vec<DummyColumn> = Vec::new();
    // Per covariate: level code -> dummy column index
    let mut encoders: Vec<(&crate::corpus::covariates::Categorical, Vec<Option<usize>>)> =
        Vec::new();

    for name in &formula.covariates {
        let column = meta.column(name)?;
        let counts = column.level_counts();
        let mut code_to_column: Vec<Option<usize>> = vec![None; column.levels().len()];
        for (code, level) in column.levels().iter().enumerate().skip(1) {
            if counts[code] == 0 {
                continue;
            }
            code_to_column[code] = Some(columns.len());
            columns.push(DummyColumn {
                covariate: name.clone(),
                level: level.clone(),
            });
        }
        encoders.push((column, code_to_column));
    }

    let p = columns.len() + 1;
    let mut design = Vec::with_capacity(meta.len());
    for row in 0..meta.len() {
        let mut x = vec![0.0; p];
        x[0] = 1.0;
        for (column, code_to_column) in &encoders {
            if let Some(j) = code_to_column[column.code(row)] {
                x[j + 1] = 1.0;
            }
        }
        design.push(x);
    }

    Ok((design, columns))
}

/// X'X for a row-major design matrix.
fn normal_matrix(design: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let p = design[0].len();
    let mut xtx = vec![vec![0.0; p]; p];
    for x in design {
        for i in 0..p {
            if x[i] == 0.0 {
                continue;
            }
            for j in 0..p {
                xtx[i][j] += x[i] * x[j];
            }
        }
    }
    xtx
}

/// beta = (X'X)^-1 X'y given the precomputed inverse.
fn solve_ols(design: &[Vec<f64>], y: &[f64], xtx_inv: &[Vec<f64>]) -> Vec<f64> {
    let p = design[0].len();
    let mut xty = vec![0.0; p];
    for (x, &yi) in design.iter().zip(y) {
        for j in 0..p {
            xty[j] += x[j] * yi;
        }
    }
    (0..p)
        .map(|i| xtx_inv[i].iter().zip(&xty).map(|(&a, &b)| a * b).sum())
        .collect()
}

/// Gauss-Jordan inverse with partial pivoting. `None` when singular.
fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let p = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..p)
        .map(|i| (0..p).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..p {
        let pivot = (col..p)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let scale = a[col][col];
        for j in 0..p {
            a[col][j] /= scale;
            inv[col][j] /= scale;
        }
        for i in 0..p {
            if i == col {
                continue;
            }
            let factor = a[i][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..p {
                a[i][j] -= factor * a[col][j];
                inv[i][j] -= factor * inv[col][j];
            }
        }
    }
    Some(inv)
}

/// Nonparametric bootstrap: resample documents with replacement, refit
/// every topic's regression, and take the per-coefficient standard
/// deviation across replicates.
fn bootstrap_se(
    design: &[Vec<f64>],
    theta: &[Vec<f64>],
    num_topics: usize,
    opts: &EffectOptions,
) -> Result<Vec<Vec<f64>>> {
    let n = design.len();
    let p = design[0].len();
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // draws[k][j] collects one estimate per successful replicate
    let mut draws: Vec<Vec<Vec<f64>>> = vec![vec![Vec::new(); p]; num_topics];
    let mut skipped = 0usize;

    for _ in 0..opts.bootstrap_reps {
        let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        let design_b: Vec<Vec<f64>> = sample.iter().map(|&i| design[i].clone()).collect();

        let Some(xtx_inv) = invert(&normal_matrix(&design_b)) else {
            // A replicate can lose every document of a level
            skipped += 1;
            continue;
        };

        for k in 0..num_topics {
            let y: Vec<f64> = sample.iter().map(|&i| theta[i][k]).collect();
            let beta = solve_ols(&design_b, &y, &xtx_inv);
            for (j, &b) in beta.iter().enumerate() {
                draws[k][j].push(b);
            }
        }
    }

    let successful = opts.bootstrap_reps - skipped;
    if successful < 2 {
        return Err(PipelineError::model(format!(
            "bootstrap produced {successful} usable replicates out of {}; \
             a covariate level is too sparse to resample",
            opts.bootstrap_reps
        )));
    }
    if skipped > 0 {
        warn!(skipped, successful, "singular bootstrap replicates skipped");
    }

    Ok(draws
        .into_iter()
        .map(|topic_draws| topic_draws.into_iter().map(|values| std_dev(&values)).collect())
        .collect())
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt()
}
