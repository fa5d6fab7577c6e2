//! Access token lifecycle: expiry checks and single-flight refresh.
//!
//! The manager guarantees two orderings under concurrent use. First, at most
//! one refresh call is in flight at any instant: the first caller to need a
//! refresh installs a shared future, and every other caller joins it and
//! adopts its outcome. Second, a request that begins while a refresh is in
//! flight waits for it to settle before reading the token, so nothing is
//! ever signed with the pre-refresh credential.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::claims;
use crate::error::{AuthError, Result};
use crate::refresh::{RefreshTransport, RefreshedTokens};
use crate::store::TokenStore;

/// Safety margin before expiry that triggers a proactive refresh.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Session state as seen by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Access token present and outside the refresh margin.
    Fresh,
    /// A refresh call is in flight.
    Refreshing,
    /// No session, or the last refresh failed. Requires re-authentication;
    /// a failed refresh token cannot be revived by retrying the same call.
    Unauthenticated,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String>>>;

struct Inner {
    store: TokenStore,
    transport: Arc<dyn RefreshTransport>,
    margin: Duration,
    state: Mutex<SessionState>,
    /// The single in-flight refresh. Check-and-install happens under the
    /// lock with no await point in between, which is what makes the
    /// single-flight guarantee hold.
    in_flight: Mutex<Option<SharedRefresh>>,
}

/// Manages the access token lifecycle for one session.
///
/// Cheap to clone; clones share state. The session triple in [`TokenStore`]
/// is mutated only through this type.
#[derive(Clone)]
pub struct TokenLifecycle {
    inner: Arc<Inner>,
}

impl TokenLifecycle {
    pub fn new(store: TokenStore, transport: Arc<dyn RefreshTransport>) -> Self {
        Self::with_margin(store, transport, DEFAULT_REFRESH_MARGIN)
    }

    pub fn with_margin(
        store: TokenStore,
        transport: Arc<dyn RefreshTransport>,
        margin: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                margin,
                state: Mutex::new(SessionState::Fresh),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Install a new session triple after login or registration.
    pub async fn install_session(
        &self,
        access: &str,
        refresh: &str,
        user: Option<&serde_json::Value>,
    ) -> Result<()> {
        self.inner.store.set_session(access, refresh, user).await?;
        *self.inner.state.lock() = SessionState::Fresh;
        tracing::debug!("session installed");
        Ok(())
    }

    /// Clear the session and mark it unusable (logout, terminal auth
    /// failure). The state transition happens even if the store fails.
    pub async fn invalidate(&self) -> Result<()> {
        let result = self.inner.store.clear().await;
        *self.inner.state.lock() = SessionState::Unauthenticated;
        tracing::debug!("session cleared");
        result
    }

    /// Cached user profile blob stored at login.
    pub async fn cached_user(&self) -> Result<Option<serde_json::Value>> {
        self.inner.store.user().await
    }

    /// True when a session exists locally (an access or refresh token is
    /// stored and the last refresh did not fail terminally).
    pub async fn has_session(&self) -> Result<bool> {
        if self.state() == SessionState::Unauthenticated {
            return Ok(false);
        }
        Ok(self.inner.store.access_token().await?.is_some()
            || self.inner.store.refresh_token().await?.is_some())
    }

    /// Return an access token with more than the safety margin left on it,
    /// refreshing first if necessary.
    pub async fn ensure_fresh(&self) -> Result<String> {
        // join an in-flight refresh before reading the token, so a request
        // that starts mid-refresh never signs with the pre-refresh token
        if let Some(shared) = self.current_in_flight() {
            return self.join(shared).await;
        }

        if self.state() == SessionState::Unauthenticated {
            return Err(AuthError::Unauthenticated);
        }

        match self.inner.store.access_token().await? {
            Some(token) if !claims::expires_within(&token, self.inner.margin) => Ok(token),
            _ => self.refresh().await,
        }
    }

    /// Reactive path: the server answered 401 for a request signed with
    /// `stale`. Skips the expiry check, but if another caller already
    /// rotated the token in the meantime the current one is returned
    /// without a network call.
    pub async fn refresh_after(&self, stale: &str) -> Result<String> {
        if let Some(shared) = self.current_in_flight() {
            return self.join(shared).await;
        }

        if let Some(current) = self.inner.store.access_token().await? {
            if current != stale {
                return Ok(current);
            }
        }

        self.refresh().await
    }

    fn current_in_flight(&self) -> Option<SharedRefresh> {
        self.inner.in_flight.lock().clone()
    }

    /// Single-flight refresh: the first caller installs the shared future,
    /// everyone else joins it.
    async fn refresh(&self) -> Result<String> {
        let shared = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fut = Self::run_refresh(self.inner.clone()).boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        self.join(shared).await
    }

    async fn join(&self, shared: SharedRefresh) -> Result<String> {
        let result = shared.clone().await;

        // first awaiter back clears the slot; ptr_eq guards against
        // clearing a newer refresh installed after this one settled
        let mut slot = self.inner.in_flight.lock();
        if slot.as_ref().is_some_and(|f| f.ptr_eq(&shared)) {
            *slot = None;
        }
        drop(slot);

        result
    }

    async fn run_refresh(inner: Arc<Inner>) -> Result<String> {
        *inner.state.lock() = SessionState::Refreshing;

        match Self::exchange(&inner).await {
            Ok(token) => {
                *inner.state.lock() = SessionState::Fresh;
                tracing::info!("access token refreshed");
                Ok(token)
            }
            Err(e) => {
                if let Err(clear_err) = inner.store.clear().await {
                    tracing::warn!(
                        "failed to clear session after refresh failure: {}",
                        clear_err
                    );
                }
                *inner.state.lock() = SessionState::Unauthenticated;
                tracing::warn!("token refresh failed: {}", e);
                Err(e)
            }
        }
    }

    async fn exchange(inner: &Inner) -> Result<String> {
        let refresh_token = inner
            .store
            .refresh_token()
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let RefreshedTokens {
            access_token,
            refresh_token: rotated,
        } = inner.transport.refresh(&refresh_token).await?;

        // the new token must be persisted before any waiter proceeds, or the
        // next request is signed with a revoked credential
        inner.store.set_access_token(&access_token).await?;
        if let Some(rotated) = rotated {
            inner.store.set_refresh_token(&rotated).await?;
        }

        Ok(access_token)
    }
}

impl fmt::Debug for TokenLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenLifecycle")
            .field("state", &self.state())
            .field("margin", &self.inner.margin)
            .finish_non_exhaustive()
    }
}
