use thiserror::Error;

pub type AttributionResult<T> = Result<T, AttributionError>;

#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Collector {collector} failed: {message}")]
    Collector {
        collector: &'static str,
        message: String,
    },

    #[error("Malformed row: {0}")]
    MalformedRow(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AttributionError {
    /// Wrap any displayable failure as a collector error.
    pub fn collector(collector: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Collector {
            collector,
            message: err.to_string(),
        }
    }
}
