use thiserror::Error;

/// Why a single input record or shuffle value was rejected.
///
/// Record errors never fail a stage: the offending record is skipped and
/// counted.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("line does not start with a url scheme: {0:?}")]
    MissingScheme(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid rank {0:?}")]
    InvalidRank(String),
    #[error("invalid out-degree {0:?}")]
    InvalidDegree(String),
    #[error("unrecognized message {0:?}")]
    UnknownMessage(String),
    #[error("record is not valid utf-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed crawl metadata")]
    Metadata(#[from] serde_json::Error),
}
