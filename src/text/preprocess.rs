// Free-text normalization: lowercase, strip punctuation, strip digits,
// remove stopwords, stem. The stage order is fixed: stopwords are
// matched against unstemmed lowercase forms, so reordering the stages
// changes the results.

use std::collections::HashSet;

use clap::ValueEnum;
use rust_stemmers::{Algorithm, Stemmer};

/// Corpus language: selects both the stopword list and stemming rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Language {
    Portuguese,
    English,
}

impl Language {
    fn stopword_language(self) -> stop_words::LANGUAGE {
        match self {
            Language::Portuguese => stop_words::LANGUAGE::Portuguese,
            Language::English => stop_words::LANGUAGE::English,
        }
    }

    fn stemmer_algorithm(self) -> Algorithm {
        match self {
            Language::Portuguese => Algorithm::Portuguese,
            Language::English => Algorithm::English,
        }
    }
}

/// The configured text preprocessor: language stopword list plus the
/// corpus-specific extra stopwords, and a Snowball stemmer.
pub struct Preprocessor {
    stopwords: HashSet<String>,
    stemmer: Stemmer,
}

impl Preprocessor {
    pub fn new(language: Language, extra_stopwords: &[String]) -> Self {
        let mut stopwords: HashSet<String> =
            stop_words::get(language.stopword_language()).into_iter().collect();
        for word in extra_stopwords {
            stopwords.insert(word.trim().to_lowercase());
        }

        Self {
            stopwords,
            stemmer: Stemmer::create(language.stemmer_algorithm()),
        }
    }

    /// Normalize one text into stemmed tokens.
    ///
    /// Single-character leftovers are dropped alongside stopwords; they
    /// are punctuation shrapnel, not words.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .chars()
            // Punctuation and symbols become token boundaries
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            // Digits are removed outright, not turned into boundaries:
            // "co2" reduces to "co" the way the original pipeline did
            .filter(|c| !c.is_numeric())
            .collect::<String>()
            .split_whitespace()
            .filter(|token| token.chars().count() >= 2)
            .filter(|token| !self.stopwords.contains(*token))
            .map(|token| self.stemmer.stem(token).to_string())
            .collect()
    }
}
