use thiserror::Error;

/// Application-wide error types for Hermes.
#[derive(Error, Debug)]
pub enum AppError {
    /// The HTTP client could not be set up.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// A listing page could not be turned into records (bad selector, broken markup).
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// The requested site key has no profile.
    #[error("Unknown site: {0}")]
    UnknownSite(String),

    /// Caller supplied an invalid job request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Job does not exist (never created, or deleted while running).
    #[error("Job not found: {0}")]
    NotFound(String),

    /// A job tried to leave a terminal state or skip a state.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Reading or writing the job snapshot failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error (missing or invalid env vars).
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
