// Unit tests for covariate normalization invariants.
//
// The properties that matter downstream: no missing values survive
// normalization, normalization is idempotent, row counts are preserved,
// and the configured reference level ends up first.

use mangrove::corpus::covariates::{Categorical, Metadata, UNKNOWN_LEVEL};
use mangrove::corpus::schema::Submission;

fn submission(uf: Option<&str>, sex: Option<&str>, education: Option<&str>) -> Submission {
    Submission {
        suggestion: "protecao da fauna".to_string(),
        catalog: "fauna".to_string(),
        uf: uf.map(|s| s.to_string()),
        sex: sex.map(|s| s.to_string()),
        residence: None,
        education: education.map(|s| s.to_string()),
        age: None,
        marital: None,
        activity: None,
        date: None,
    }
}

fn sample_submissions() -> Vec<Submission> {
    vec![
        submission(Some("SP"), Some("M"), Some("superior")),
        submission(None, Some("F"), None),
        submission(Some("RJ"), None, Some("primario")),
        submission(Some("SP"), Some("F"), Some("")),
        submission(Some("MG"), Some("M"), Some("secundario")),
    ]
}

// ============================================================
// No-missing-values invariant
// ============================================================

#[test]
fn no_column_contains_missing_values_after_normalization() {
    let meta = Metadata::from_submissions(&sample_submissions(), &[]);
    for column in meta.columns() {
        for row in 0..meta.len() {
            let level = column.level_of(row);
            assert!(!level.is_empty(), "{}[{row}] is empty", column.name());
        }
    }
}

#[test]
fn missing_cells_read_unknown() {
    let meta = Metadata::from_submissions(&sample_submissions(), &[]);
    let uf = meta.column("uf").unwrap();
    assert_eq!(uf.level_of(1), UNKNOWN_LEVEL);
    let education = meta.column("education").unwrap();
    assert_eq!(education.level_of(1), UNKNOWN_LEVEL);
    // Empty string is missing too, not a level of its own
    assert_eq!(education.level_of(3), UNKNOWN_LEVEL);
}

#[test]
fn normalization_never_drops_rows() {
    let submissions = sample_submissions();
    let meta = Metadata::from_submissions(&submissions, &[]);
    assert_eq!(meta.len(), submissions.len());
    for column in meta.columns() {
        assert_eq!(column.len(), submissions.len());
    }
}

// ============================================================
// Reference levels
// ============================================================

#[test]
fn configured_reference_is_first_level() {
    let references = vec![("uf".to_string(), "SP".to_string())];
    let meta = Metadata::from_submissions(&sample_submissions(), &references);
    assert_eq!(meta.column("uf").unwrap().reference(), "SP");
}

#[test]
fn reference_rotation_does_not_relabel_rows() {
    let submissions = sample_submissions();
    let plain = Metadata::from_submissions(&submissions, &[]);
    let rotated = Metadata::from_submissions(
        &submissions,
        &[("uf".to_string(), "MG".to_string())],
    );
    for row in 0..submissions.len() {
        assert_eq!(
            plain.column("uf").unwrap().level_of(row),
            rotated.column("uf").unwrap().level_of(row),
            "row {row} changed level when only the ordering should move"
        );
    }
}

#[test]
fn unknown_can_be_the_reference() {
    let references = vec![("uf".to_string(), UNKNOWN_LEVEL.to_string())];
    let meta = Metadata::from_submissions(&sample_submissions(), &references);
    assert_eq!(meta.column("uf").unwrap().reference(), UNKNOWN_LEVEL);
}

// ============================================================
// Idempotence
// ============================================================

#[test]
fn renormalizing_normalized_data_is_a_noop() {
    let raw: Vec<Option<String>> = vec![
        Some("RJ".to_string()),
        None,
        Some("SP".to_string()),
        Some("RJ".to_string()),
        Some(String::new()),
    ];
    let once = Categorical::from_values("uf", &raw, Some("SP"));

    let normalized: Vec<Option<String>> = (0..once.len())
        .map(|row| Some(once.level_of(row).to_string()))
        .collect();
    let twice = Categorical::from_values("uf", &normalized, Some("SP"));

    assert_eq!(once.levels(), twice.levels());
    for row in 0..once.len() {
        assert_eq!(once.code(row), twice.code(row), "row {row} recoded");
    }
}

// ============================================================
// Level bookkeeping
// ============================================================

#[test]
fn level_counts_sum_to_row_count() {
    let meta = Metadata::from_submissions(&sample_submissions(), &[]);
    for column in meta.columns() {
        let total: usize = column.level_counts().iter().sum();
        assert_eq!(total, meta.len(), "{} counts do not cover all rows", column.name());
    }
}

#[test]
fn retain_keeps_alignment_and_level_set() {
    let meta = Metadata::from_submissions(&sample_submissions(), &[]);
    let keep = vec![true, false, true, false, true];
    let kept = meta.retain(&keep).unwrap();
    assert_eq!(kept.len(), 3);
    assert_eq!(
        kept.column("uf").unwrap().levels(),
        meta.column("uf").unwrap().levels(),
        "closed level set must survive row filtering"
    );
}

#[test]
fn retain_rejects_wrong_mask_length() {
    let meta = Metadata::from_submissions(&sample_submissions(), &[]);
    assert!(meta.retain(&[true, false]).is_err());
}
