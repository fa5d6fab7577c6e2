//! HTTP client SDK for the Bellor API.
//!
//! Everything the application sends routes through one pipeline: pre-flight
//! token validation, snake_case conversion of outgoing JSON, dispatch with a
//! freshly read bearer token, a single refresh-and-retry on 401, and
//! camelCase conversion of incoming JSON. Binary and multipart payloads
//! bypass the key conversions entirely.
//!
//! Token state lives in [`bellor-auth`](bellor_auth): concurrent requests
//! that discover an expired token share a single refresh call instead of
//! issuing duplicates.
//!
//! # Example
//!
//! ```no_run
//! use bellor_client::{BellorClient, LoginRequest};
//!
//! # async fn example() -> bellor_client::Result<()> {
//! let client = BellorClient::builder()
//!     .base_url("https://api.bellor.app")
//!     .build()?;
//!
//! // explicit startup step: revive a stored session before the first
//! // authenticated request
//! if !client.auth().resume_session().await? {
//!     client
//!         .auth()
//!         .login(&LoginRequest {
//!             email: "user@example.com".into(),
//!             password: "secret".into(),
//!         })
//!         .await?;
//! }
//!
//! let me = client.users().me().await?;
//! println!("{:?}", me.first_name);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod body;
pub mod client;
pub mod error;
pub mod transform;
pub mod types;

pub use api::{AuthApi, UsersApi};
pub use body::{Body, MultipartPayload};
pub use client::{BellorClient, ClientBuilder, RequestOptions};
pub use error::{Error, Result};
pub use types::*;

// Session state is part of the public surface (e.g. for logout redirects)
pub use bellor_auth::SessionState;
