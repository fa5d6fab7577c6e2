//! Auth API: login, registration, session resume, logout.
//!
//! These are the calls that bypass the pipeline's own token handling: a
//! login cannot require a token, and the refresh path must not recurse
//! into itself.

use reqwest::Method;
use serde_json::Value;

use crate::body::Body;
use crate::client::{BellorClient, RequestOptions};
use crate::error::{Error, Result};
use crate::types::{AuthSession, LoginRequest, RegisterRequest, UserProfile};

/// Auth API client.
pub struct AuthApi {
    client: BellorClient,
}

impl AuthApi {
    pub(crate) fn new(client: BellorClient) -> Self {
        Self { client }
    }

    /// Log in with email and password and install the session triple.
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthSession> {
        self.establish("auth/login", Body::json(request)?).await
    }

    /// Register a new account. The backend returns a full session on
    /// success, which is installed like a login.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthSession> {
        self.establish("auth/register", Body::json(request)?).await
    }

    async fn establish(&self, path: &str, body: Body) -> Result<AuthSession> {
        let value = self
            .client
            .request(Method::POST, path, body, RequestOptions::unauthenticated())
            .await?;

        let session: AuthSession = serde_json::from_value(unwrap_envelope(value))?;
        self.client
            .lifecycle()
            .install_session(
                &session.access_token,
                &session.refresh_token,
                session.user.as_ref(),
            )
            .await?;

        Ok(session)
    }

    /// Awaited startup step: make sure a usable access token exists before
    /// the application issues its first authenticated request.
    ///
    /// Returns `false` when no stored session exists or it could not be
    /// revived; callers should route to login. Storage and network errors
    /// still surface as errors.
    pub async fn resume_session(&self) -> Result<bool> {
        if !self.client.lifecycle().has_session().await? {
            return Ok(false);
        }
        match self.client.lifecycle().ensure_fresh().await {
            Ok(_) => Ok(true),
            Err(e) if e.is_terminal() => Ok(false),
            Err(e) => Err(Error::Auth(e)),
        }
    }

    /// Log out: best-effort server-side revocation, then clear the session.
    pub async fn logout(&self) -> Result<()> {
        // local teardown proceeds even when the server can't be reached
        if let Err(e) = self
            .client
            .request_raw(
                Method::POST,
                "auth/logout",
                Body::Empty,
                RequestOptions::default(),
            )
            .await
        {
            tracing::debug!("logout notification failed: {}", e);
        }

        self.client.lifecycle().invalidate().await?;
        Ok(())
    }

    /// The user profile cached at login, if any.
    pub async fn current_user(&self) -> Result<Option<UserProfile>> {
        match self.client.lifecycle().cached_user().await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// True when a session is present locally.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.client.lifecycle().has_session().await?)
    }
}

/// Auth endpoints answer either enveloped (`{"success":true,"data":{...}}`)
/// or bare; accept both.
fn unwrap_envelope(mut value: Value) -> Value {
    match value.get_mut("data") {
        Some(data) if data.is_object() => data.take(),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope_nested_and_bare() {
        let enveloped = json!({"success": true, "data": {"accessToken": "a"}});
        assert_eq!(unwrap_envelope(enveloped), json!({"accessToken": "a"}));

        let bare = json!({"accessToken": "a"});
        assert_eq!(unwrap_envelope(bare.clone()), bare);
    }
}
