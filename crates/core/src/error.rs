use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported input format: {0:?}")]
    UnsupportedInput(PathBuf),
    #[error("pdf extract failed for {path:?}: {reason}")]
    Pdf { path: PathBuf, reason: String },
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

impl From<anyhow::Error> for ExtractError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
