use thiserror::Error;

/// Errors surfaced by the client library
#[derive(Debug, Error)]
pub enum DebiaiError {
    /// Malformed, duplicate or already-set schema definitions
    #[error("Schema error: {0}")]
    Schema(String),

    /// Tabular input or result tree does not match the schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Project, model, selection or tag unknown to the backend
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend refused the call because the target already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backend could not be reached or the request did not complete
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with an unexpected status
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DebiaiError {
    pub fn schema(message: impl Into<String>) -> Self {
        DebiaiError::Schema(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DebiaiError::Validation(message.into())
    }

    /// Whether the error came from the transport layer rather than from caller input
    pub fn is_transport(&self) -> bool {
        matches!(self, DebiaiError::Transport(_) | DebiaiError::Backend { .. })
    }
}

impl From<reqwest::Error> for DebiaiError {
    fn from(err: reqwest::Error) -> Self {
        DebiaiError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DebiaiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_detail() {
        let err = DebiaiError::schema("Each result name need to be unique");
        assert!(err.to_string().contains("unique"));

        let err = DebiaiError::Backend {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Backend error (500): boom");
        assert!(err.is_transport());
        assert!(!DebiaiError::validation("x").is_transport());
    }
}
