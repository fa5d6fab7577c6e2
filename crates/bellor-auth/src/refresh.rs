//! Refresh protocol against the Bellor token endpoint.
//!
//! The refresh call is raw transport: it never goes through the request
//! pipeline, never carries an Authorization header, and never sees the
//! access token. Only the refresh token travels, in the request body.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Default timeout for a refresh call, independent of request timeouts.
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// New credentials returned by the refresh endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Present only when the server rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Raw transport to the refresh endpoint.
///
/// A trait seam so the lifecycle manager can be driven by a counting fake in
/// tests.
#[async_trait]
pub trait RefreshTransport: Send + Sync + fmt::Debug {
    /// Exchange a refresh token for new credentials.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens>;
}

/// HTTP transport posting `{"refresh_token": ...}` to the token endpoint.
#[derive(Debug, Clone)]
pub struct HttpRefresher {
    client: reqwest::Client,
    refresh_url: String,
    timeout: Duration,
}

impl HttpRefresher {
    pub fn new(refresh_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            refresh_url: refresh_url.into(),
            timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RefreshTransport for HttpRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        let response = self
            .client
            .post(&self.refresh_url)
            .header("Content-Type", "application/json")
            .json(&RefreshRequest { refresh_token })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::Network(format!("Failed to parse refresh response: {}", e)))?;

        parse_refresh_body(status.as_u16(), body)
    }
}

/// Accept both the Bellor envelope (`{"success":true,"data":{...}}`) and a
/// bare token object. A 2xx response without an access token is still a
/// rejected refresh.
fn parse_refresh_body(status: u16, mut body: serde_json::Value) -> Result<RefreshedTokens> {
    let payload = match body.get_mut("data") {
        Some(data) if data.is_object() => data.take(),
        _ => body,
    };

    let tokens: RefreshedTokens = serde_json::from_value(payload).map_err(|_| {
        AuthError::Rejected {
            status,
            message: "no access token in refresh response".to_string(),
        }
    })?;

    if tokens.access_token.is_empty() {
        return Err(AuthError::Rejected {
            status,
            message: "no access token in refresh response".to_string(),
        });
    }

    Ok(tokens)
}
