use thiserror::Error;

/// Every failure the tracker surfaces to a driver or rider.
///
/// Nothing here is fatal: callers report the message and return to the
/// interactive flow.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Rejected locally before any remote call was made.
    #[error("{0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    /// A store, network or HTTP call failed. Never retried automatically.
    #[error("Remote operation failed: {0}")]
    Remote(String),
}

impl TrackerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<sqlx::Error> for TrackerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("row".to_string()),
            other => Self::Remote(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Remote(e.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for TrackerError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        Self::Remote(e.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Remote(format!("malformed payload: {}", e))
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(e: std::io::Error) -> Self {
        Self::Remote(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
