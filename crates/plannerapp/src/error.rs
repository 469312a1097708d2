use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The server asked us to come back later (503 / 429).
    #[error("Service temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network unreachable: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl PlannerError {
    /// Server-signaled overload. Retried on a schedule instead of being reported.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PlannerError::Unavailable(_))
    }

    /// Failures that may succeed if the same request is sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            PlannerError::Unavailable(_) | PlannerError::Timeout | PlannerError::Network(_) => true,
            PlannerError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;
