//! Error types for session and token management.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while managing the token lifecycle.
///
/// `Clone` because a single refresh outcome is fanned out to every caller
/// waiting on the shared in-flight future.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Network/transport error while talking to the refresh endpoint.
    #[error("Network error: {0}")]
    Network(String),

    /// The refresh endpoint rejected the refresh token.
    #[error("Refresh rejected ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the refresh endpoint.
        status: u16,
        /// Error message from the server.
        message: String,
    },

    /// The backing key-value store failed a read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored token could not be decoded.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// No usable session: never authenticated, or the last refresh failed.
    #[error("Not authenticated")]
    Unauthenticated,
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

impl AuthError {
    /// True when the session is unusable and the caller must re-authenticate.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthError::Rejected { .. } | AuthError::Unauthenticated
        )
    }
}
