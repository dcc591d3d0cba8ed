// Document-term corpus: interned token sequences, the vocabulary, and
// the aligned metadata table. The alignment invariant lives here: any
// operation that drops a document drops its metadata row in the same
// call, and the post-conditions are checked before the corpus crosses a
// stage boundary.

use std::collections::HashMap;

use tracing::info;

use crate::corpus::covariates::Metadata;
use crate::error::{PipelineError, Result};
use crate::text::preprocess::Preprocessor;

/// Term id into [`Corpus::vocab`].
pub type TermId = usize;

/// The vectorized corpus: documents as term-id sequences, the vocabulary
/// they index into, and the co-indexed covariate table.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub docs: Vec<Vec<TermId>>,
    pub vocab: Vec<String>,
    pub meta: Metadata,
}

impl Corpus {
    /// Tokenize and intern raw texts against aligned metadata.
    ///
    /// Documents that come out empty are kept (zero-length) and flagged
    /// through [`Corpus::empty_documents`]; the pruning step removes
    /// them together with their metadata rows so all three outputs stay
    /// co-indexed.
    pub fn build(texts: &[String], meta: Metadata, preprocessor: &Preprocessor) -> Result<Self> {
        if texts.len() != meta.len() {
            return Err(PipelineError::data(format!(
                "{} texts against {} metadata rows",
                texts.len(),
                meta.len()
            )));
        }

        let mut term_ids: HashMap<String, TermId> = HashMap::new();
        let mut vocab: Vec<String> = Vec::new();
        let mut docs: Vec<Vec<TermId>> = Vec::with_capacity(texts.len());

        for text in texts {
            let doc: Vec<TermId> = preprocessor
                .tokenize(text)
                .into_iter()
                .map(|token| {
                    *term_ids.entry(token.clone()).or_insert_with(|| {
                        vocab.push(token);
                        vocab.len() - 1
                    })
                })
                .collect();
            docs.push(doc);
        }

        let empty = docs.iter().filter(|d| d.is_empty()).count();
        info!(
            documents = docs.len(),
            vocabulary = vocab.len(),
            empty_documents = empty,
            "document-term corpus built"
        );

        Ok(Self { docs, vocab, meta })
    }

    /// Indices of documents with no tokens after preprocessing.
    pub fn empty_documents(&self) -> Vec<usize> {
        self.docs
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of distinct documents each term occurs in.
    pub fn document_frequency(&self) -> Vec<usize> {
        let mut df = vec![0usize; self.vocab.len()];
        let mut seen = vec![usize::MAX; self.vocab.len()];
        for (doc_idx, doc) in self.docs.iter().enumerate() {
            for &term in doc {
                if seen[term] != doc_idx {
                    seen[term] = doc_idx;
                    df[term] += 1;
                }
            }
        }
        df
    }

    /// Drop terms below the document-frequency threshold, then drop
    /// now-empty documents and their metadata rows.
    ///
    /// Post-conditions: non-empty vocabulary, every surviving document
    /// non-empty, documents and metadata the same length. A threshold
    /// that empties the vocabulary or the corpus is a configuration
    /// error, surfaced instead of silently tolerated.
    pub fn prune(self, min_doc_freq: usize) -> Result<Self> {
        let df = self.document_frequency();

        let mut remap = vec![None; self.vocab.len()];
        let mut vocab = Vec::new();
        for (term, &freq) in df.iter().enumerate() {
            if freq >= min_doc_freq {
                remap[term] = Some(vocab.len());
                vocab.push(self.vocab[term].clone());
            }
        }

        if vocab.is_empty() {
            return Err(PipelineError::config(format!(
                "no term appears in {min_doc_freq}+ documents; the vocabulary pruned to nothing"
            )));
        }

        let docs_pruned: Vec<Vec<TermId>> = self
            .docs
            .iter()
            .map(|doc| doc.iter().filter_map(|&t| remap[t]).collect())
            .collect();

        let keep: Vec<bool> = docs_pruned.iter().map(|d| !d.is_empty()).collect();
        let dropped = keep.iter().filter(|&&k| !k).count();
        let docs: Vec<Vec<TermId>> = docs_pruned.into_iter().filter(|d| !d.is_empty()).collect();
        let meta = self.meta.retain(&keep)?;

        if docs.is_empty() {
            return Err(PipelineError::config(format!(
                "every document emptied at min document frequency {min_doc_freq}"
            )));
        }
        if docs.len() != meta.len() {
            return Err(PipelineError::data(format!(
                "alignment broken after pruning: {} documents, {} metadata rows",
                docs.len(),
                meta.len()
            )));
        }

        info!(
            vocabulary = vocab.len(),
            documents = docs.len(),
            dropped_documents = dropped,
            "vocabulary pruned"
        );

        Ok(Self { docs, vocab, meta })
    }

    /// Total token count across all documents.
    pub fn token_count(&self) -> usize {
        self.docs.iter().map(|d| d.len()).sum()
    }
}
