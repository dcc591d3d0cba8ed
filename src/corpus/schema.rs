// Record schema for the assembly-submission export.
//
// The export is a flat table, one row per citizen letter. The schema is
// validated once against the header row; any missing required column is
// reported by name before a single record is parsed.

use chrono::NaiveDate;

use crate::error::{PipelineError, Result};

/// Names of the required columns in the export file.
///
/// Defaults match the archive's own header names; a differently-labeled
/// export can remap them without touching the loader.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub suggestion: String,
    pub catalog: String,
    pub uf: String,
    pub sex: String,
    pub residence: String,
    pub education: String,
    pub age: String,
    pub marital: String,
    pub activity: String,
    pub date: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            suggestion: "sugestao".to_string(),
            catalog: "catalogo".to_string(),
            uf: "uf".to_string(),
            sex: "sexo".to_string(),
            residence: "moradia".to_string(),
            education: "escolaridade".to_string(),
            age: "faixa_etaria".to_string(),
            marital: "estado_civil".to_string(),
            activity: "atividade".to_string(),
            date: "data".to_string(),
        }
    }
}

impl ColumnMap {
    /// All required column names, for header validation.
    pub fn required(&self) -> [&str; 10] {
        [
            &self.suggestion,
            &self.catalog,
            &self.uf,
            &self.sex,
            &self.residence,
            &self.education,
            &self.age,
            &self.marital,
            &self.activity,
            &self.date,
        ]
    }

    /// Resolve each required column to its index in the header row.
    /// Matching is case-insensitive; header cells are trimmed first.
    pub fn resolve(&self, headers: &[String]) -> Result<ColumnIndices> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let missing: Vec<&str> = self
            .required()
            .iter()
            .filter(|name| find(name).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::data(format!(
                "export is missing required columns: {}",
                missing.join(", ")
            )));
        }

        // Unwraps cannot fire: every name was just checked
        Ok(ColumnIndices {
            suggestion: find(&self.suggestion).unwrap_or_default(),
            catalog: find(&self.catalog).unwrap_or_default(),
            uf: find(&self.uf).unwrap_or_default(),
            sex: find(&self.sex).unwrap_or_default(),
            residence: find(&self.residence).unwrap_or_default(),
            education: find(&self.education).unwrap_or_default(),
            age: find(&self.age).unwrap_or_default(),
            marital: find(&self.marital).unwrap_or_default(),
            activity: find(&self.activity).unwrap_or_default(),
            date: find(&self.date).unwrap_or_default(),
        })
    }
}

/// Resolved positions of the required columns within one export file.
#[derive(Debug, Clone, Copy)]
pub struct ColumnIndices {
    pub suggestion: usize,
    pub catalog: usize,
    pub uf: usize,
    pub sex: usize,
    pub residence: usize,
    pub education: usize,
    pub age: usize,
    pub marital: usize,
    pub activity: usize,
    pub date: usize,
}

/// One citizen submission, parsed and typed.
///
/// Text fields keep their raw decoded form (preprocessing happens much
/// later); demographic fields are `None` when the cell was empty, and
/// stay `None` until the covariate normalizer maps them to the explicit
/// unknown level.
#[derive(Debug, Clone)]
pub struct Submission {
    pub suggestion: String,
    pub catalog: String,
    pub uf: Option<String>,
    pub sex: Option<String>,
    pub residence: Option<String>,
    pub education: Option<String>,
    pub age: Option<String>,
    pub marital: Option<String>,
    pub activity: Option<String>,
    pub date: Option<NaiveDate>,
}

impl Submission {
    /// Parse one CSV record using resolved column positions.
    ///
    /// Returns the submission plus whether the date cell was present but
    /// unparseable (the caller aggregates these into one warning).
    pub fn from_record(record: &csv::StringRecord, idx: &ColumnIndices) -> Result<(Self, bool)> {
        let cell = |i: usize| -> Result<&str> {
            record.get(i).ok_or_else(|| {
                PipelineError::data(format!("row {:?} is shorter than the header", record.position()))
            })
        };

        let optional = |i: usize| -> Result<Option<String>> {
            let value = cell(i)?.trim();
            Ok(if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            })
        };

        let raw_date = cell(idx.date)?.trim();
        let date = if raw_date.is_empty() {
            None
        } else {
            NaiveDate::parse_from_str(raw_date, "%d/%m/%Y").ok()
        };
        let date_malformed = !raw_date.is_empty() && date.is_none();

        Ok((
            Self {
                suggestion: cell(idx.suggestion)?.trim().to_string(),
                catalog: cell(idx.catalog)?.trim().to_string(),
                uf: optional(idx.uf)?,
                sex: optional(idx.sex)?,
                residence: optional(idx.residence)?,
                education: optional(idx.education)?,
                age: optional(idx.age)?,
                marital: optional(idx.marital)?,
                activity: optional(idx.activity)?,
                date,
            },
            date_malformed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_reports_missing_columns_by_name() {
        let map = ColumnMap::default();
        let headers: Vec<String> = ["sugestao", "catalogo", "uf"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let err = map.resolve(&headers).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sexo"), "missing column not named: {msg}");
        assert!(!msg.contains("catalogo"), "present column listed: {msg}");
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let map = ColumnMap::default();
        let headers: Vec<String> = [
            "SUGESTAO",
            "Catalogo",
            "UF",
            "Sexo",
            "Moradia",
            "Escolaridade",
            "Faixa_Etaria",
            "Estado_Civil",
            "Atividade",
            "Data",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let idx = map.resolve(&headers).unwrap();
        assert_eq!(idx.suggestion, 0);
        assert_eq!(idx.date, 9);
    }
}
