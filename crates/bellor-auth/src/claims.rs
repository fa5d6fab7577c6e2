//! Local inspection of JWT access tokens.
//!
//! Expiry is read straight from the token's payload segment, without a
//! network round trip and without signature verification. Verifying the
//! signature is the server's job; the client only needs to know whether the
//! token is worth sending at all.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

use crate::error::{AuthError, Result};

#[derive(Debug, Deserialize)]
struct ExpClaim {
    exp: u64,
}

/// Extract the `exp` claim (seconds since epoch) from a JWT access token.
pub fn expiry_of(token: &str) -> Result<u64> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => {
            return Err(AuthError::InvalidToken(
                "expected three dot-separated segments".to_string(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {}", e)))?;

    let claims: ExpClaim = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("payload has no exp claim: {}", e)))?;

    Ok(claims.exp)
}

/// True when `token` expires within `margin` from now.
///
/// An undecodable token counts as expired: refreshing is the only way to
/// recover from a credential we cannot even read.
pub fn expires_within(token: &str, margin: Duration) -> bool {
    match expiry_of(token) {
        Ok(exp) => now_secs() + margin.as_secs() >= exp,
        Err(_) => true,
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
