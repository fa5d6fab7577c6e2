//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying transport failed (timeout, DNS, connection reset).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Token lifecycle failure: refresh rejected, storage failure, or no
    /// usable session.
    #[error("Auth error: {0}")]
    Auth(#[from] bellor_auth::AuthError),

    /// The server rejected the call as unauthenticated even after a refresh
    /// and a retry. The session has been cleared.
    #[error("Authentication expired")]
    AuthExpired,

    /// A payload could not be safely converted between key conventions.
    #[error("Transform error: {0}")]
    Transform(String),

    /// Server returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from the server, when present.
        code: String,
        /// Error message from the server.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Transient transport failure; the caller may retry on its own terms.
    /// The pipeline itself never retries beyond the single 401 reattempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Terminal authentication failure; the application should treat this
    /// as "log the user out".
    pub fn is_auth_error(&self) -> bool {
        match self {
            Error::AuthExpired => true,
            Error::Auth(e) => e.is_terminal(),
            Error::Api { status: 401, .. } => true,
            _ => false,
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_classification() {
        assert!(Error::AuthExpired.is_auth_error());
        assert!(Error::Auth(bellor_auth::AuthError::Unauthenticated).is_auth_error());
        assert!(
            Error::Api {
                status: 401,
                code: "unauthorized".to_string(),
                message: "expired".to_string(),
            }
            .is_auth_error()
        );
        assert!(!Error::Auth(bellor_auth::AuthError::Network("reset".to_string())).is_auth_error());
    }

    #[test]
    fn test_status_classification() {
        let not_found = Error::Api {
            status: 404,
            code: "not_found".to_string(),
            message: "no such user".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_server_error());

        let server = Error::Api {
            status: 503,
            code: "unavailable".to_string(),
            message: "down".to_string(),
        };
        assert!(server.is_server_error());
    }
}
