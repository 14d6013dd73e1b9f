use thiserror::Error;

/// The single error family for the whisper engine. Every fallible
/// public operation returns `Result<T, WhisperError>` so callers can
/// catch-all match on one type.
#[derive(Error, Debug)]
pub enum WhisperError {
    #[error("corrupt file: {0}")]
    CorruptFile(String),

    #[error("invalid time interval: {0}")]
    InvalidTimeInterval(String),

    #[error("timestamp not covered by any archive: {0}")]
    TimestampNotCovered(String),

    #[error("invalid aggregation method: {0}")]
    InvalidAggregationMethod(String),

    #[error("archive boundary exceeded: {0}")]
    ArchiveBoundaryExceeded(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid retention value: {0}")]
    ValueError(String),

    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WhisperError>;
