// Keyword filter: retains submissions whose designated text fields
// match any of the configured keywords, case-insensitively.

use regex_lite::{Regex, RegexBuilder};
use tracing::info;

use super::schema::Submission;
use crate::config::FilterFields;
use crate::error::{PipelineError, Result};

/// A compiled keyword filter.
///
/// The keywords are combined into a single alternation pattern compiled
/// once; matching a submission is then a scan of its designated fields.
pub struct KeywordFilter {
    pattern: Regex,
    fields: FilterFields,
}

impl KeywordFilter {
    /// Compile a filter from a keyword list. An empty list is a
    /// configuration error: it would silently discard the whole corpus.
    pub fn new(keywords: &[String], fields: FilterFields) -> Result<Self> {
        let escaped: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex_lite::escape)
            .collect();
        if escaped.is_empty() {
            return Err(PipelineError::config(
                "keyword filter needs at least one keyword",
            ));
        }

        let pattern = RegexBuilder::new(&escaped.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|e| PipelineError::config(format!("keyword pattern failed to compile: {e}")))?;

        Ok(Self { pattern, fields })
    }

    /// Whether a single submission passes the filter.
    pub fn matches(&self, submission: &Submission) -> bool {
        match self.fields {
            FilterFields::CatalogOnly => self.pattern.is_match(&submission.catalog),
            FilterFields::CatalogAndSuggestion => {
                self.pattern.is_match(&submission.catalog)
                    || self.pattern.is_match(&submission.suggestion)
            }
        }
    }

    /// Retain the matching subset, preserving order.
    pub fn apply(&self, submissions: Vec<Submission>) -> Result<Vec<Submission>> {
        let before = submissions.len();
        let kept: Vec<Submission> = submissions
            .into_iter()
            .filter(|s| self.matches(s))
            .collect();

        if kept.is_empty() {
            return Err(PipelineError::data(
                "keyword filter matched no submissions; check the keyword list and filter fields",
            ));
        }
        info!(before, after = kept.len(), "keyword filter applied");
        Ok(kept)
    }
}
