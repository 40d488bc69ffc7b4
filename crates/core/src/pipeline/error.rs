use std::path::PathBuf;

use thiserror::Error;

/// Run-level failures. Per-frame and per-crop problems never surface here;
/// they are logged and the item is skipped.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot read video {path}: {reason}")]
    Input { path: PathBuf, reason: String },
    #[error("unsupported video format {path}: expected one of {expected}")]
    UnsupportedFormat { path: PathBuf, expected: String },
    #[error("scratch storage failure at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cancelled")]
    Cancelled,
    #[error("failed to load face detector: {0}")]
    Detector(String),
    #[error("failed to load embedding model: {0}")]
    Embedder(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn input(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Input {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
