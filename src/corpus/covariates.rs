// Covariate normalization: closed-category demographic columns.
//
// Each demographic field becomes a `Categorical`: a closed set of levels
// with missing cells mapped to the literal unknown level and the
// regression reference level rotated to position 0. Normalization never
// drops a row, and renormalizing already-normalized data is a no-op.

use std::collections::HashMap;

use tracing::warn;

use super::schema::Submission;
use crate::error::{PipelineError, Result};

/// The explicit category for missing demographic cells.
pub const UNKNOWN_LEVEL: &str = "unknown";

/// One categorical column: a closed level set plus per-row level codes.
///
/// The reference (baseline) level always sits at index 0. Levels persist
/// even when row filtering later leaves them with zero observations;
/// the category set is a property of the column, not of the surviving
/// rows.
#[derive(Debug, Clone)]
pub struct Categorical {
    name: String,
    levels: Vec<String>,
    codes: Vec<u32>,
}

impl Categorical {
    /// Build a column from raw optional values.
    ///
    /// Levels are collected in first-seen order, with `None`/empty cells
    /// mapped to [`UNKNOWN_LEVEL`]. When `reference` names a present
    /// level it is rotated to the front; a reference that never occurs
    /// in the data is ignored with a warning.
    pub fn from_values(name: &str, values: &[Option<String>], reference: Option<&str>) -> Self {
        let mut levels: Vec<String> = Vec::new();
        let mut level_ids: HashMap<String, u32> = HashMap::new();
        let mut codes = Vec::with_capacity(values.len());

        for value in values {
            let level = match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v,
                _ => UNKNOWN_LEVEL,
            };
            let code = *level_ids.entry(level.to_string()).or_insert_with(|| {
                levels.push(level.to_string());
                (levels.len() - 1) as u32
            });
            codes.push(code);
        }

        let mut column = Self {
            name: name.to_string(),
            levels,
            codes,
        };
        if let Some(reference) = reference {
            column.set_reference(reference);
        }
        column
    }

    /// Rotate `reference` to level index 0, remapping codes. A no-op when
    /// it already is the reference or does not occur in the column.
    fn set_reference(&mut self, reference: &str) {
        match self.levels.iter().position(|l| l == reference) {
            Some(0) | None => {
                if !self.levels.iter().any(|l| l == reference) {
                    warn!(
                        column = self.name,
                        reference, "reference level never occurs; keeping first-seen order"
                    );
                }
            }
            Some(pos) => {
                let level = self.levels.remove(pos);
                self.levels.insert(0, level);
                // Old code `pos` becomes 0; codes below `pos` shift up by one
                for code in &mut self.codes {
                    let c = *code as usize;
                    *code = if c == pos {
                        0
                    } else if c < pos {
                        (c + 1) as u32
                    } else {
                        *code
                    };
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// The baseline level all other levels are compared against.
    pub fn reference(&self) -> &str {
        &self.levels[0]
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Level index of one row.
    pub fn code(&self, row: usize) -> usize {
        self.codes[row] as usize
    }

    /// Level label of one row.
    pub fn level_of(&self, row: usize) -> &str {
        &self.levels[self.codes[row] as usize]
    }

    /// Observation count per level, aligned with `levels()`.
    pub fn level_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.levels.len()];
        for &code in &self.codes {
            counts[code as usize] += 1;
        }
        counts
    }

    /// Copy of this column restricted to rows where `keep` is true.
    /// The level set is preserved as-is.
    fn retain(&self, keep: &[bool]) -> Self {
        let codes = self
            .codes
            .iter()
            .zip(keep)
            .filter(|(_, &k)| k)
            .map(|(&c, _)| c)
            .collect();
        Self {
            name: self.name.clone(),
            levels: self.levels.clone(),
            codes,
        }
    }
}

/// The per-document covariate table, index-aligned with the documents
/// through every downstream filter and prune.
#[derive(Debug, Clone)]
pub struct Metadata {
    columns: Vec<Categorical>,
    rows: usize,
}

impl Metadata {
    /// Normalize the demographic fields of filtered submissions into
    /// closed categorical columns. Row count is preserved exactly.
    pub fn from_submissions(submissions: &[Submission], references: &[(String, String)]) -> Self {
        let reference_for = |name: &str| {
            references
                .iter()
                .find(|(covariate, _)| covariate == name)
                .map(|(_, level)| level.as_str())
        };

        let column = |name: &str, extract: fn(&Submission) -> Option<String>| {
            let values: Vec<Option<String>> = submissions.iter().map(extract).collect();
            Categorical::from_values(name, &values, reference_for(name))
        };

        let columns = vec![
            column("uf", |s| s.uf.clone()),
            column("sex", |s| s.sex.clone()),
            column("residence", |s| s.residence.clone()),
            column("education", |s| s.education.clone()),
            column("age", |s| s.age.clone()),
            column("marital", |s| s.marital.clone()),
            column("activity", |s| s.activity.clone()),
        ];

        Self {
            columns,
            rows: submissions.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Categorical] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Result<&Categorical> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| {
                PipelineError::config(format!("formula names unknown covariate '{name}'"))
            })
    }

    /// Restrict all columns to rows where `keep` is true. Used by the
    /// vocabulary pruner to keep documents and metadata aligned.
    pub fn retain(&self, keep: &[bool]) -> Result<Self> {
        if keep.len() != self.rows {
            return Err(PipelineError::data(format!(
                "alignment mask has {} entries for {} metadata rows",
                keep.len(),
                self.rows
            )));
        }
        let rows = keep.iter().filter(|&&k| k).count();
        let columns = self.columns.iter().map(|c| c.retain(keep)).collect();
        Ok(Self { columns, rows })
    }

    /// Group rows by their combination of levels across the named
    /// covariates. Returns a dense group id per row and the group count.
    pub fn profile_ids(&self, covariates: &[String]) -> Result<(Vec<usize>, usize)> {
        let columns: Vec<&Categorical> = covariates
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<_>>()?;

        let mut group_ids: HashMap<Vec<usize>, usize> = HashMap::new();
        let mut ids = Vec::with_capacity(self.rows);
        for row in 0..self.rows {
            let key: Vec<usize> = columns.iter().map(|c| c.code(row)).collect();
            let next = group_ids.len();
            let id = *group_ids.entry(key).or_insert(next);
            ids.push(id);
        }
        let count = group_ids.len();
        Ok((ids, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(raw: &[Option<&str>]) -> Vec<Option<String>> {
        raw.iter().map(|v| v.map(|s| s.to_string())).collect()
    }

    #[test]
    fn missing_cells_map_to_unknown() {
        let column = Categorical::from_values(
            "uf",
            &values(&[Some("SP"), None, Some(""), Some("RJ")]),
            None,
        );
        assert_eq!(column.level_of(1), UNKNOWN_LEVEL);
        assert_eq!(column.level_of(2), UNKNOWN_LEVEL);
        assert_eq!(column.len(), 4);
    }

    #[test]
    fn reference_rotated_to_front_with_codes_remapped() {
        let column = Categorical::from_values(
            "uf",
            &values(&[Some("RJ"), Some("SP"), Some("MG"), Some("SP")]),
            Some("SP"),
        );
        assert_eq!(column.reference(), "SP");
        assert_eq!(column.levels(), &["SP", "RJ", "MG"]);
        assert_eq!(column.level_of(0), "RJ");
        assert_eq!(column.level_of(1), "SP");
        assert_eq!(column.code(1), 0);
        assert_eq!(column.level_of(3), "SP");
    }

    #[test]
    fn absent_reference_keeps_first_seen_order() {
        let column = Categorical::from_values(
            "uf",
            &values(&[Some("RJ"), Some("MG")]),
            Some("SP"),
        );
        assert_eq!(column.levels(), &["RJ", "MG"]);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = values(&[Some("RJ"), None, Some("SP"), Some("RJ")]);
        let once = Categorical::from_values("uf", &raw, Some("SP"));

        // Feed the normalized labels back through
        let renormalized: Vec<Option<String>> = (0..once.len())
            .map(|row| Some(once.level_of(row).to_string()))
            .collect();
        let twice = Categorical::from_values("uf", &renormalized, Some("SP"));

        assert_eq!(once.levels(), twice.levels());
        for row in 0..once.len() {
            assert_eq!(once.level_of(row), twice.level_of(row));
        }
    }

    #[test]
    fn retain_preserves_level_set() {
        let column = Categorical::from_values(
            "uf",
            &values(&[Some("SP"), Some("RJ"), Some("MG")]),
            None,
        );
        let kept = column.retain(&[true, false, true]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.levels(), column.levels());
        assert_eq!(kept.level_of(1), "MG");
    }

    #[test]
    fn profile_ids_group_by_level_combination() {
        let submissions: Vec<Submission> = [("SP", "M"), ("SP", "F"), ("SP", "M"), ("RJ", "M")]
            .iter()
            .map(|(uf, sex)| Submission {
                suggestion: String::new(),
                catalog: String::new(),
                uf: Some(uf.to_string()),
                sex: Some(sex.to_string()),
                residence: None,
                education: None,
                age: None,
                marital: None,
                activity: None,
                date: None,
            })
            .collect();
        let meta = Metadata::from_submissions(&submissions, &[]);
        let (ids, count) = meta
            .profile_ids(&["uf".to_string(), "sex".to_string()])
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(ids[0], ids[2]);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[0], ids[3]);
    }

    #[test]
    fn unknown_covariate_in_profile_is_config_error() {
        let meta = Metadata::from_submissions(&[], &[]);
        let result = meta.profile_ids(&["favorite_color".to_string()]);
        assert!(matches!(
            result,
            Err(crate::error::PipelineError::Configuration(_))
        ));
    }
}
