//! Domain-level error taxonomy for aemport.

/// Failures reported by an external collaborator (generation service,
/// reviewer, build command).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid collaborator configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Other(String),
}

/// aemport domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("invalid configuration: {}", problems.join("; "))]
    Config { problems: Vec<String> },

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("no source files found for component {0}")]
    NoFiles(String),

    #[error("all file analyses failed for component {0}")]
    AllAnalysesFailed(String),

    #[error("generation failed for {component}: {reason}")]
    Generation { component: String, reason: String },

    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: CollaboratorError,
    },

    #[error("duplicate review check name: {0}")]
    DuplicateCheck(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortError {
    /// Configuration problems are reported before any pipeline stage runs.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, PortError::Config { .. } | PortError::DuplicateCheck(_))
    }
}

/// Result type for aemport domain operations.
pub type Result<T> = std::result::Result<T, PortError>;
