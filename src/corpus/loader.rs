// Corpus loading: semicolon-delimited export in a legacy Latin encoding.
//
// The file is decoded in one pass before parsing: the archive predates
// UTF-8 and byte-level CSV splitting would otherwise work by accident
// only until a delimiter byte shows up inside a multi-byte sequence.

use std::fs;
use std::path::Path;

use encoding_rs::Encoding;
use tracing::{info, warn};

use super::schema::{ColumnMap, Submission};
use crate::error::{PipelineError, Result};

/// Read and validate the full export into typed submissions.
///
/// Fails with a `DataError` on a missing file, an unknown or mismatched
/// encoding, or a header missing required columns. Rows with unparseable
/// date cells are kept (date becomes `None`) and reported as one warning.
pub fn read_submissions(
    path: &Path,
    encoding_label: &str,
    columns: &ColumnMap,
) -> Result<Vec<Submission>> {
    let encoding = Encoding::for_label(encoding_label.as_bytes()).ok_or_else(|| {
        PipelineError::config(format!("unknown encoding label '{encoding_label}'"))
    })?;

    let bytes = fs::read(path).map_err(|e| {
        PipelineError::data(format!("cannot read corpus file {}: {e}", path.display()))
    })?;

    let (decoded, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        return Err(PipelineError::data(format!(
            "corpus file {} does not decode as {}",
            path.display(),
            encoding.name()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::data(format!("cannot parse header row: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let indices = columns.resolve(&headers)?;

    let mut submissions = Vec::new();
    let mut malformed_dates = 0usize;
    for record in reader.records() {
        let record =
            record.map_err(|e| PipelineError::data(format!("malformed CSV record: {e}")))?;
        let (submission, date_malformed) = Submission::from_record(&record, &indices)?;
        if date_malformed {
            malformed_dates += 1;
        }
        submissions.push(submission);
    }

    if submissions.is_empty() {
        return Err(PipelineError::data(format!(
            "corpus file {} contains no data rows",
            path.display()
        )));
    }
    if malformed_dates > 0 {
        warn!(count = malformed_dates, "rows with unparseable date cells kept with no date");
    }
    info!(rows = submissions.len(), encoding = encoding.name(), "corpus loaded");

    Ok(submissions)
}
