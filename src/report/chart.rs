// Point-and-interval comparison charts for covariate effects.
//
// One horizontal line per covariate level: the point estimate with its
// 95% interval (± 1.96 × SE), mapped onto a fixed character width and
// sorted by estimate. The reference level renders dimmed at zero, so
// every other level reads as a shift relative to it.

use colored::Colorize;

use crate::error::{PipelineError, Result};
use crate::model::effects::{EffectRow, EffectsTable};

const AXIS_WIDTH: usize = 44;
const Z_95: f64 = 1.96;

/// Render one chart to stdout.
pub fn render(table: &EffectsTable, topic: usize, covariate: &str) -> Result<()> {
    print!("{}", render_to_string(table, topic, covariate)?);
    Ok(())
}

/// Build the chart as a string (kept separate so tests can assert on
/// content without capturing stdout).
pub fn render_to_string(table: &EffectsTable, topic: usize, covariate: &str) -> Result<String> {
    if topic == 0 || topic > table.num_topics {
        return Err(PipelineError::render(format!(
            "topic {topic} is outside 1..={}",
            table.num_topics
        )));
    }

    let mut rows: Vec<&EffectRow> = table.rows_for(topic, covariate);
    if rows.is_empty() {
        return Err(PipelineError::render(format!(
            "covariate '{covariate}' has no rows; it was not in the prevalence formula"
        )));
    }
    rows.sort_by(|a, b| b.estimate.total_cmp(&a.estimate));

    let reference = rows
        .iter()
        .find(|r| r.reference)
        .map(|r| r.level.clone())
        .unwrap_or_default();

    // Scale covering every interval and zero
    let mut lo = 0.0f64;
    let mut hi = 0.0f64;
    for row in &rows {
        lo = lo.min(row.estimate - Z_95 * row.std_error);
        hi = hi.max(row.estimate + Z_95 * row.std_error);
    }
    if (hi - lo).abs() < f64::EPSILON {
        // Single reference row: give the axis some room around zero
        lo = -0.5;
        hi = 0.5;
    }

    let column_of = |value: f64| -> usize {
        let frac = (value - lo) / (hi - lo);
        (frac * (AXIS_WIDTH - 1) as f64).round().clamp(0.0, (AXIS_WIDTH - 1) as f64) as usize
    };

    let label_width = rows.iter().map(|r| r.level.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!(
        "\n{}\n\n",
        format!("=== Topic {topic}: {covariate} effects (vs {reference}) ===").bold()
    ));

    let zero_col = column_of(0.0);
    for row in &rows {
        let mut cells: Vec<char> = vec![' '; AXIS_WIDTH];
        cells[zero_col] = '|';

        let start = column_of(row.estimate - Z_95 * row.std_error);
        let end = column_of(row.estimate + Z_95 * row.std_error);
        for cell in cells.iter_mut().take(end + 1).skip(start) {
            *cell = '-';
        }
        if end > start {
            cells[start] = '(';
            cells[end] = ')';
        }
        cells[column_of(row.estimate)] = '*';

        let axis: String = cells.into_iter().collect();
        let interval_lo = row.estimate - Z_95 * row.std_error;
        let interval_hi = row.estimate + Z_95 * row.std_error;

        let colored_axis = if row.reference {
            axis.dimmed()
        } else if interval_lo > 0.0 {
            axis.green()
        } else if interval_hi < 0.0 {
            axis.red()
        } else {
            axis.normal()
        };

        let label = if row.reference {
            format!("{:>label_width$}", row.level).dimmed().to_string()
        } else {
            format!("{:>label_width$}", row.level)
        };

        out.push_str(&format!(
            "  {} {} {:+.3} ± {:.3}\n",
            label, colored_axis, row.estimate, row.std_error
        ));
    }

    // Numeric scale under the axis
    out.push_str(&format!(
        "  {:>label_width$} {:<width$}{:.3}\n\n",
        "",
        format!("{lo:.3}"),
        hi,
        width = AXIS_WIDTH - format!("{hi:.3}").chars().count(),
    ));

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::effects::{EffectRow, EffectsTable};

    fn row(topic: usize, covariate: &str, level: &str, estimate: f64, se: f64, reference: bool) -> EffectRow {
        EffectRow {
            topic,
            covariate: covariate.to_string(),
            level: level.to_string(),
            estimate,
            std_error: se,
            reference,
        }
    }

    fn table() -> EffectsTable {
        EffectsTable {
            num_topics: 3,
            rows: vec![
                row(1, "uf", "SP", 0.0, 0.0, true),
                row(1, "uf", "RJ", 0.04, 0.01, false),
                row(1, "uf", "MG", -0.02, 0.015, false),
            ],
        }
    }

    #[test]
    fn renders_all_levels() {
        let chart = render_to_string(&table(), 1, "uf").unwrap();
        for level in ["SP", "RJ", "MG"] {
            assert!(chart.contains(level), "missing level {level}: {chart}");
        }
    }

    #[test]
    fn sorted_by_estimate_descending() {
        let chart = render_to_string(&table(), 1, "uf").unwrap();
        // Match row labels (line-leading, padded), not the title mention
        let rj = chart.find("  RJ ").unwrap();
        let sp = chart.find("  SP ").unwrap();
        let mg = chart.find("  MG ").unwrap();
        assert!(rj < sp && sp < mg, "rows out of order: {chart}");
    }

    #[test]
    fn out_of_range_topic_is_render_error() {
        assert!(matches!(
            render_to_string(&table(), 0, "uf"),
            Err(PipelineError::Render(_))
        ));
        assert!(matches!(
            render_to_string(&table(), 4, "uf"),
            Err(PipelineError::Render(_))
        ));
    }

    #[test]
    fn covariate_absent_from_formula_is_render_error() {
        assert!(matches!(
            render_to_string(&table(), 1, "sex"),
            Err(PipelineError::Render(_))
        ));
    }

    #[test]
    fn reference_only_chart_renders() {
        let lone = EffectsTable {
            num_topics: 1,
            rows: vec![row(1, "uf", "SP", 0.0, 0.0, true)],
        };
        let chart = render_to_string(&lone, 1, "uf").unwrap();
        assert!(chart.contains("SP"));
        assert!(chart.contains('*'), "point marker missing: {chart}");
    }
}
