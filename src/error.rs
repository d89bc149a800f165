// SpatialBench Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed QA id: {0}")]
    MalformedId(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Record index {index} out of range for group {group}")]
    IndexOutOfRange { group: String, index: usize },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for AnnotatorError {
    fn from(err: anyhow::Error) -> Self {
        AnnotatorError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnnotatorError>;
