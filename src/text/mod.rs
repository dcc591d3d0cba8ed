// Text preprocessing: normalization, tokenization, stemming, and the
// document-term representation with vocabulary pruning.

pub mod dtm;
pub mod preprocess;
