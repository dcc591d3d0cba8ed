use std::io;

use thiserror::Error;

/// Error type for every pipeline stage.
///
/// Each stage fails fast at its boundary: a stage never hands the next
/// stage a partially aligned corpus. The variants mirror where in the
/// pipeline the failure belongs, so `main` can report "bad config" vs.
/// "bad data" without string matching.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("data error: {0}")]
    Data(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("render error: {0}")]
    Render(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}
