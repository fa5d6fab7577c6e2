//! Session storage: a typed wrapper over an injected key-value store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AuthError, Result};

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "bellor_access_token";
/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "bellor_refresh_token";
/// Storage key for the cached user profile.
pub const USER_KEY: &str = "bellor_user";

/// Injected key-value persistence backend.
///
/// Implementations may be backed by anything that can get/set/remove strings
/// by key. Absent keys are `Ok(None)`, never an error; failed writes must
/// surface as errors rather than being dropped silently.
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store, used in tests and as the default backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Typed access to the session triple (access token, refresh token, cached
/// user profile).
///
/// The triple is mutated only through [`TokenLifecycle`](crate::TokenLifecycle):
/// login installs it whole, refresh replaces the tokens, logout and terminal
/// refresh failure clear everything.
#[derive(Debug, Clone)]
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Store backed by a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub async fn access_token(&self) -> Result<Option<String>> {
        self.kv.get(ACCESS_TOKEN_KEY).await
    }

    pub async fn refresh_token(&self) -> Result<Option<String>> {
        self.kv.get(REFRESH_TOKEN_KEY).await
    }

    /// Cached user profile blob, as stored at login.
    pub async fn user(&self) -> Result<Option<serde_json::Value>> {
        match self.kv.get(USER_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| AuthError::Storage(format!("corrupt cached user: {}", e))),
            None => Ok(None),
        }
    }

    pub async fn set_access_token(&self, token: &str) -> Result<()> {
        self.kv.set(ACCESS_TOKEN_KEY, token).await
    }

    pub async fn set_refresh_token(&self, token: &str) -> Result<()> {
        self.kv.set(REFRESH_TOKEN_KEY, token).await
    }

    pub async fn set_user(&self, user: &serde_json::Value) -> Result<()> {
        let raw = serde_json::to_string(user).map_err(|e| AuthError::Storage(e.to_string()))?;
        self.kv.set(USER_KEY, &raw).await
    }

    /// Replace the whole triple (login, registration, OAuth completion).
    pub async fn set_session(
        &self,
        access: &str,
        refresh: &str,
        user: Option<&serde_json::Value>,
    ) -> Result<()> {
        self.set_access_token(access).await?;
        self.set_refresh_token(refresh).await?;
        if let Some(user) = user {
            self.set_user(user).await?;
        }
        Ok(())
    }

    /// Remove all three kinds. Every removal is attempted before the first
    /// failure is surfaced, so an error never leaves a half-cleared session.
    pub async fn clear(&self) -> Result<()> {
        let access = self.kv.remove(ACCESS_TOKEN_KEY).await;
        let refresh = self.kv.remove(REFRESH_TOKEN_KEY).await;
        let user = self.kv.remove(USER_KEY).await;
        access.and(refresh).and(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_absent_keys_read_as_none() {
        let store = TokenStore::in_memory();
        assert!(store.access_token().await.unwrap().is_none());
        assert!(store.refresh_token().await.unwrap().is_none());
        assert!(store.user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_get_tokens() {
        let store = TokenStore::in_memory();
        store.set_access_token("access-1").await.unwrap();
        store.set_refresh_token("refresh-1").await.unwrap();

        assert_eq!(store.access_token().await.unwrap().unwrap(), "access-1");
        assert_eq!(store.refresh_token().await.unwrap().unwrap(), "refresh-1");
    }

    #[tokio::test]
    async fn test_user_blob_round_trips() {
        let store = TokenStore::in_memory();
        let user = json!({"id": "u1", "firstName": "John"});
        store.set_user(&user).await.unwrap();

        assert_eq!(store.user().await.unwrap().unwrap(), user);
    }

    #[tokio::test]
    async fn test_set_session_replaces_triple() {
        let store = TokenStore::in_memory();
        store.set_session("a1", "r1", None).await.unwrap();
        store
            .set_session("a2", "r2", Some(&json!({"id": "u2"})))
            .await
            .unwrap();

        assert_eq!(store.access_token().await.unwrap().unwrap(), "a2");
        assert_eq!(store.refresh_token().await.unwrap().unwrap(), "r2");
        assert_eq!(store.user().await.unwrap().unwrap()["id"], "u2");
    }

    #[tokio::test]
    async fn test_clear_removes_all_three() {
        let store = TokenStore::in_memory();
        store
            .set_session("a1", "r1", Some(&json!({"id": "u1"})))
            .await
            .unwrap();

        store.clear().await.unwrap();

        assert!(store.access_token().await.unwrap().is_none());
        assert!(store.refresh_token().await.unwrap().is_none());
        assert!(store.user().await.unwrap().is_none());
    }
}
