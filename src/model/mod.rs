// Model estimation: the covariate-aware topic model and the per-topic
// prevalence regressions.

pub mod effects;
pub mod stm;

use crate::corpus::covariates::Metadata;
use crate::error::{PipelineError, Result};

/// The prevalence formula: which covariates modulate topic proportions.
///
/// Accepts the additive form `~ uf + sex + education`. Interactions are
/// not supported; the original analysis never used them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevalenceFormula {
    pub covariates: Vec<String>,
}

impl PrevalenceFormula {
    pub fn parse(raw: &str) -> Result<Self> {
        let body = raw
            .trim()
            .strip_prefix('~')
            .ok_or_else(|| {
                PipelineError::config(format!("prevalence formula must start with '~': '{raw}'"))
            })?
            .trim();

        if body.is_empty() {
            return Err(PipelineError::config(
                "prevalence formula names no covariates",
            ));
        }

        let mut covariates = Vec::new();
        for term in body.split('+') {
            let name = term.trim();
            if name.is_empty() {
                return Err(PipelineError::config(format!(
                    "empty term in prevalence formula '{raw}'"
                )));
            }
            if covariates.iter().any(|c| c == name) {
                return Err(PipelineError::config(format!(
                    "covariate '{name}' appears twice in the prevalence formula"
                )));
            }
            covariates.push(name.to_string());
        }

        Ok(Self { covariates })
    }

    /// Check every named covariate exists in the metadata.
    pub fn validate(&self, meta: &Metadata) -> Result<()> {
        for name in &self.covariates {
            meta.column(name)?;
        }
        Ok(())
    }
}
