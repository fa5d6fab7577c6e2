//! Session storage and token lifecycle for the Bellor API.
//!
//! Owns the session triple (access token, refresh token, cached user
//! profile) and keeps the access token usable: expiry is checked locally
//! before every authenticated request, and an expiring token is exchanged
//! through the refresh endpoint with a single-flight guarantee, so
//! concurrent callers share one in-flight refresh instead of issuing
//! duplicates.
//!
//! # Components
//!
//! - [`store`] — injected key-value persistence and the typed session triple
//! - [`claims`] — local JWT expiry inspection (no network, no verification)
//! - [`refresh`] — the refresh-endpoint wire protocol
//! - [`lifecycle`] — expiry checks, single-flight refresh, session state

pub mod claims;
pub mod error;
pub mod lifecycle;
pub mod refresh;
pub mod store;

pub use error::{AuthError, Result};
pub use lifecycle::{DEFAULT_REFRESH_MARGIN, SessionState, TokenLifecycle};
pub use refresh::{HttpRefresher, RefreshTransport, RefreshedTokens};
pub use store::{KeyValueStore, MemoryStore, TokenStore};
