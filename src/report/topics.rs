// Topic listing: ranked terms per topic with corpus-wide shares.
//
// This is the output reviewed after a fit to judge whether the chosen K
// produced interpretable topics before any effect chart is read.

use colored::Colorize;

use crate::model::stm::FittedModel;

/// Display every topic: corpus share bar plus its top terms.
pub fn display_topics(model: &FittedModel, top_n: usize) {
    let shares = corpus_shares(model);
    let bar_width: usize = 20;

    println!(
        "\n{}",
        format!(
            "=== {} topics over {} documents ===",
            model.num_topics,
            model.theta().len()
        )
        .bold()
    );
    println!();

    for (k, terms) in model.top_terms(top_n).iter().enumerate() {
        let share = shares[k];
        let filled = (share * bar_width as f64).round() as usize;
        let bar = format!(
            "[{}{}]",
            "=".repeat(filled.min(bar_width)),
            " ".repeat(bar_width.saturating_sub(filled))
        );

        let colored_bar = if share >= 0.15 {
            bar.bright_green()
        } else if share >= 0.05 {
            bar.bright_yellow()
        } else {
            bar.bright_blue()
        };

        let term_list = terms
            .iter()
            .map(|(term, _)| term.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        println!("  Topic {:>2} {} {:.3}", k + 1, colored_bar, share);
        println!("    {}", term_list.dimmed());
    }
    println!();
}

/// Mean topic proportion across documents; sums to 1 over topics.
pub fn corpus_shares(model: &FittedModel) -> Vec<f64> {
    let docs = model.theta().len().max(1) as f64;
    let mut shares = vec![0.0; model.num_topics];
    for row in model.theta() {
        for (k, &value) in row.iter().enumerate() {
            shares[k] += value;
        }
    }
    for share in &mut shares {
        *share /= docs;
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::covariates::Metadata;
    use crate::corpus::schema::Submission;
    use crate::model::stm::{fit, Init, StmOptions};
    use crate::model::PrevalenceFormula;
    use crate::text::dtm::Corpus;
    use crate::text::preprocess::{Language, Preprocessor};

    #[test]
    fn corpus_shares_sum_to_one() {
        let submissions: Vec<Submission> = ["SP", "RJ", "SP"]
            .iter()
            .map(|uf| Submission {
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
            })
            .collect();
        let meta = Metadata::from_submissions(&submissions, &[]);
        let texts = vec![
            "rivers forest wildlife".to_string(),
            "taxes budget spending".to_string(),
            "forest rivers".to_string(),
        ];
        let pre = Preprocessor::new(Language::English, &[]);
        let corpus = Corpus::build(&texts, meta, &pre).unwrap();
        let model = fit(
            &corpus,
            &PrevalenceFormula::parse("~ uf").unwrap(),
            &StmOptions {
                num_topics: 2,
                max_iters: 30,
                init: Init::Seeded(3),
                ..StmOptions::default()
            },
        )
        .unwrap();

        let total: f64 = corpus_shares(&model).iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "shares sum to {total}");
    }
}
