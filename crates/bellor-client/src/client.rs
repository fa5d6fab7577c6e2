//! Main client implementation.
//!
//! Every call runs the same pipeline: pre-flight token validation, outgoing
//! snake_case conversion, dispatch with a freshly read bearer token, a
//! single refresh-and-retry on 401, incoming camelCase conversion.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

use bellor_auth::{
    DEFAULT_REFRESH_MARGIN, HttpRefresher, KeyValueStore, MemoryStore, RefreshTransport,
    SessionState, TokenLifecycle, TokenStore,
};

use crate::api::{AuthApi, UsersApi};
use crate::body::Body;
use crate::error::{Error, Result};
use crate::transform::{to_camel, to_snake};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bellor API client.
///
/// # Example
///
/// ```no_run
/// use bellor_client::BellorClient;
///
/// # async fn example() -> bellor_client::Result<()> {
/// let client = BellorClient::builder()
///     .base_url("https://api.bellor.app")
///     .build()?;
///
/// if client.auth().resume_session().await? {
///     let me = client.users().me().await?;
///     println!("hello, {:?}", me.first_name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BellorClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    /// HTTP client.
    pub(crate) http: reqwest::Client,
    /// Base URL for API requests.
    pub(crate) base_url: Url,
    /// Request timeout.
    pub(crate) timeout: Duration,
    /// Token lifecycle manager; the only path to the session triple.
    pub(crate) lifecycle: TokenLifecycle,
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Attach a bearer token and enable the 401 refresh-retry. Default.
    pub authenticated: bool,
    /// Query parameters, serialized as given (no key conversion).
    pub query: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            authenticated: true,
            query: None,
        }
    }
}

impl RequestOptions {
    /// Options for calls that must bypass the token pipeline entirely:
    /// login, registration, and the refresh call itself.
    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            query: None,
        }
    }
}

/// Outgoing body after the one-time wire conversion, reusable across the
/// original attempt and the 401 retry.
enum WireBody {
    None,
    Json(Value),
    Multipart(crate::body::MultipartPayload),
    Bytes { content_type: String, data: Vec<u8> },
}

impl WireBody {
    fn prepare(body: Body) -> Result<Self> {
        Ok(match body {
            Body::Empty => WireBody::None,
            // the only arm that is key-converted; binary payloads must
            // reach the wire byte-identical
            Body::Json(value) => WireBody::Json(to_snake(value)?),
            Body::Multipart(payload) => WireBody::Multipart(payload),
            Body::Bytes { content_type, data } => WireBody::Bytes { content_type, data },
        })
    }
}

impl BellorClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Session state as seen by the lifecycle manager.
    pub fn session_state(&self) -> SessionState {
        self.inner.lifecycle.state()
    }

    pub(crate) fn lifecycle(&self) -> &TokenLifecycle {
        &self.inner.lifecycle
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the auth API.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    /// Access the users API.
    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request pipeline
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner
            .base_url
            .join(&format!("api/v1/{}", path))
            .map_err(Error::from)
    }

    /// Run one logical call through the full pipeline and return the JSON
    /// response body with application-convention (camelCase) keys.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Body,
        options: RequestOptions,
    ) -> Result<Value> {
        let response = self.request_raw(method, path, body, options).await?;
        let value: Value = response.json().await?;
        to_camel(value)
    }

    /// Same pipeline, returning the raw response. For non-JSON payloads
    /// (image downloads, streams), which pass through untransformed.
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        body: Body,
        options: RequestOptions,
    ) -> Result<reqwest::Response> {
        let url = self.url(path)?;
        let wire = WireBody::prepare(body)?;

        // token is read after the pre-flight settles, never cached across
        // calls, so a concurrent refresh is always observed
        let token = if options.authenticated {
            Some(self.inner.lifecycle.ensure_fresh().await?)
        } else {
            None
        };

        tracing::debug!(%method, %url, authenticated = options.authenticated, "dispatching");
        let response = self
            .dispatch(&method, &url, &wire, options.query.as_ref(), token.as_deref())
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED && options.authenticated {
            let stale = token.unwrap_or_default();
            tracing::warn!(%url, "401 received, refreshing and retrying once");
            let fresh = self.inner.lifecycle.refresh_after(&stale).await?;

            let retried = self
                .dispatch(&method, &url, &wire, options.query.as_ref(), Some(&fresh))
                .await?;

            if retried.status() == StatusCode::UNAUTHORIZED {
                // the server keeps rejecting this client; give up rather
                // than loop, and drop the dead session
                if let Err(e) = self.inner.lifecycle.invalidate().await {
                    tracing::warn!("failed to clear session after repeated 401: {}", e);
                }
                return Err(Error::AuthExpired);
            }

            return self.check_status(retried).await;
        }

        self.check_status(response).await
    }

    /// One dispatch attempt.
    async fn dispatch(
        &self,
        method: &Method,
        url: &Url,
        wire: &WireBody,
        query: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .timeout(self.inner.timeout);

        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(query) = query {
            request = request.query(query);
        }

        request = match wire {
            WireBody::None => request,
            WireBody::Json(value) => request.json(value),
            WireBody::Multipart(payload) => request.multipart(payload.to_form()?),
            WireBody::Bytes { content_type, data } => request
                .header(CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
        };

        request.send().await.map_err(Error::from)
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract an error from a failed response.
    async fn extract_error(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body: Option<Value> = response.json().await.ok();
        let (code, message) = parse_error_body(status, body);

        if status == 404 {
            Error::NotFound(message)
        } else {
            Error::Api {
                status,
                code,
                message,
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Typed helpers for API implementations
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(Method::GET, path, Body::Empty, RequestOptions::default())
            .await
    }

    pub(crate) async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let options = RequestOptions {
            query: Some(serde_json::to_value(query)?),
            ..RequestOptions::default()
        };
        self.execute(Method::GET, path, Body::Empty, options).await
    }

    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        self.execute(Method::POST, path, Body::json(body)?, RequestOptions::default())
            .await
    }

    pub(crate) async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        self.execute(Method::PUT, path, Body::json(body)?, RequestOptions::default())
            .await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<()> {
        self.request_raw(Method::DELETE, path, Body::Empty, RequestOptions::default())
            .await
            .map(|_| ())
    }

    pub(crate) async fn post_multipart<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: crate::body::MultipartPayload,
    ) -> Result<T> {
        self.execute(
            Method::POST,
            path,
            Body::Multipart(payload),
            RequestOptions::default(),
        )
        .await
    }

    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Body,
        options: RequestOptions,
    ) -> Result<T> {
        let value = self.request(method, path, body, options).await?;
        serde_json::from_value(value).map_err(Error::from)
    }
}

/// Pull a code and message out of whatever error shape the server sent:
/// `{"error": {"code", "message"}}`, a flat `{"code", "message"}`, or
/// nothing usable at all.
fn parse_error_body(status: u16, body: Option<Value>) -> (String, String) {
    let fallback = || ("unknown".to_string(), format!("HTTP {}", status));

    let Some(body) = body else {
        return fallback();
    };
    let source = match body.get("error") {
        Some(error) if error.is_object() => error,
        _ => &body,
    };

    let message = source
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    let code = source
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    match message {
        Some(message) => (code, message),
        None => fallback(),
    }
}

/// Builder for creating a [`BellorClient`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    refresh_margin: Option<Duration>,
    user_agent: Option<String>,
    store: Option<Arc<dyn KeyValueStore>>,
    refresher: Option<Arc<dyn RefreshTransport>>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL for the server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the safety margin before token expiry that triggers a proactive
    /// refresh.
    pub fn refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = Some(margin);
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Inject the key-value store backing the session triple. Defaults to
    /// an in-memory store.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the refresh transport (tests). Defaults to POSTing to
    /// `auth/refresh` under the base URL.
    pub fn refresh_transport(mut self, refresher: Arc<dyn RefreshTransport>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<BellorClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        // Parse and normalize base URL
        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let kv = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let token_store = TokenStore::new(kv);

        let refresher: Arc<dyn RefreshTransport> = match self.refresher {
            Some(refresher) => refresher,
            None => {
                let refresh_url = base_url.join("api/v1/auth/refresh")?;
                Arc::new(HttpRefresher::new(refresh_url.as_str()).with_timeout(timeout))
            }
        };

        let lifecycle = TokenLifecycle::with_margin(
            token_store,
            refresher,
            self.refresh_margin.unwrap_or(DEFAULT_REFRESH_MARGIN),
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("bellor-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(BellorClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout,
                lifecycle,
            }),
        })
    }
}
