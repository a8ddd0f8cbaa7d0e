use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid options, detected before any measurement starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A measurement that can't be turned into a bandwidth figure.
    #[error("invalid measurement: {0}")]
    Measurement(String),

    /// The transport reported a failure.
    #[error("transport error: {0}")]
    Transport(#[from] commbench::Error),

    /// A log line matched a known pattern but couldn't be parsed.
    #[error("parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to load options: {0}")]
    Options(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
