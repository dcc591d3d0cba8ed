// Corpus ingestion: typed loading, keyword filtering, covariate
// normalization. Everything downstream of this module works with
// validated records; malformed exports are rejected here.

pub mod covariates;
pub mod filter;
pub mod loader;
pub mod schema;
