use thiserror::Error;

pub type Result<T> = std::result::Result<T, PodiumError>;

/// Error taxonomy for workspace operations.
///
/// Every variant maps to exactly one transport status code in `podium-api`:
/// 401 / 403 / 404 / 400 / 409 / 503 / 500.
#[derive(Error, Debug)]
pub enum PodiumError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("Deployment failed: {message}")]
    DeploymentFailed { message: String, output: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PodiumError {
    /// Shorthand for runtime-call failures surfaced by the adapter.
    pub fn runtime(err: impl std::fmt::Display) -> Self {
        PodiumError::RuntimeUnavailable(err.to_string())
    }
}
