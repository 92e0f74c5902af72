#![warn(missing_docs)]
//! # nexis-auth
//!
//! ## Purpose
//! Implements the session token store and the login flow for `dark-nexis`.
//!
//! ## Responsibilities
//! - Hold the access/refresh token pair and persist it through a
//!   [`TokenStorage`] backend.
//! - Exchange credentials for tokens through an injectable
//!   [`AuthTransport`], bounded by a timeout.
//! - Provide the canned demo identity used when no user is signed in.
//!
//! ## Data flow
//! Caller supplies [`Credentials`] -> [`Authenticator::login`] sends a
//! [`LoginRequest`] through the transport -> [`TokenResponse`] ->
//! [`SessionStore::save`] -> other crates read [`SessionStore::auth_headers`].
//!
//! ## Ownership and lifetimes
//! The [`SessionStore`] is constructed once per running client and shared as
//! `Arc<SessionStore>`; there is no process-wide singleton.
//!
//! ## Error model
//! Internally every failure is an [`AuthError`]. The public `login` surface
//! collapses them into `bool` and leaves the prior session untouched.
//!
//! ## Security and privacy notes
//! Credentials, tokens and token pairs redact secrets in `Debug` output, and
//! this crate never logs token values.
//!
//! ## Example
//! ```rust
//! use nexis_auth::{SessionStore, TokenPair};
//!
//! let session = SessionStore::in_memory();
//! assert!(!session.is_authenticated());
//! session.save(&TokenPair::new("abc", Some("def".to_string())));
//! assert!(session.is_authenticated());
//! session.clear();
//! assert!(session.auth_headers().is_empty());
//! ```

mod storage;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub use storage::{
    ACCESS_TOKEN_KEY, FileTokenStorage, MemoryTokenStorage, REFRESH_TOKEN_KEY, TokenStorage,
};

/// Required path of the token issuance endpoint.
pub const TOKEN_ENDPOINT_PATH: &str = "/api/v1/auth/login/access-token";

/// Demo account accepted by the backend.
pub const DEMO_USERNAME: &str = "demo@example.com";

/// Password of the demo account.
pub const DEMO_PASSWORD: &str = "password";

/// Bound on one login round trip.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// User-provided login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account username (an email address for the demo backend).
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Builds credentials from owned or borrowed strings.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The canned demo identity.
    pub fn demo() -> Self {
        Self::new(DEMO_USERNAME, DEMO_PASSWORD)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Form body sent to the token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    /// Username field.
    pub username: String,
    /// Password field.
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Token endpoint success payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for protected API calls.
    pub access_token: String,
    /// Refresh token; stored but never exercised.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token scheme, normally `bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Access/refresh token pair handed to the session store.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenPair {
    /// Access token.
    pub access_token: String,
    /// Refresh token, when issued.
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Builds a token pair.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

impl From<TokenResponse> for TokenPair {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Current token pair, mirrored to durable storage.
///
/// Tokens never expire here; the backend is the only authority on validity.
pub struct SessionStore {
    session: RwLock<Session>,
    storage: Arc<dyn TokenStorage>,
}

impl SessionStore {
    /// Opens the store and rehydrates tokens from `storage`.
    ///
    /// Read failures are logged and treated as an absent session.
    pub fn open(storage: Arc<dyn TokenStorage>) -> Self {
        let access_token = read_entry(storage.as_ref(), ACCESS_TOKEN_KEY);
        let refresh_token = read_entry(storage.as_ref(), REFRESH_TOKEN_KEY);
        debug!(
            authenticated = access_token.is_some(),
            "session store rehydrated"
        );

        Self {
            session: RwLock::new(Session {
                access_token,
                refresh_token,
            }),
            storage,
        }
    }

    /// Opens a store backed by [`MemoryTokenStorage`].
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryTokenStorage::new()))
    }

    /// Overwrites the in-memory and persisted tokens.
    ///
    /// Persistence failures are logged; the in-memory session still changes.
    pub fn save(&self, tokens: &TokenPair) {
        let access_token = non_empty(Some(tokens.access_token.clone()));
        let refresh_token = non_empty(tokens.refresh_token.clone());

        {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            session.access_token = access_token.clone();
            session.refresh_token = refresh_token.clone();
        }

        persist_entry(self.storage.as_ref(), ACCESS_TOKEN_KEY, access_token.as_deref());
        persist_entry(self.storage.as_ref(), REFRESH_TOKEN_KEY, refresh_token.as_deref());
    }

    /// Removes both tokens from memory and storage.
    pub fn clear(&self) {
        {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            *session = Session::default();
        }

        persist_entry(self.storage.as_ref(), ACCESS_TOKEN_KEY, None);
        persist_entry(self.storage.as_ref(), REFRESH_TOKEN_KEY, None);
    }

    /// Returns `true` iff a non-empty access token is held.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Raw access token, when present.
    pub fn access_token(&self) -> Option<String> {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        session.access_token.clone()
    }

    /// Raw refresh token, when present.
    pub fn refresh_token(&self) -> Option<String> {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        session.refresh_token.clone()
    }

    /// `Authorization: Bearer <token>` when authenticated, otherwise empty.
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.access_token() {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("stored access token is not a valid header value"),
            }
        }
        headers
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

fn read_entry(storage: &dyn TokenStorage, key: &str) -> Option<String> {
    match storage.read(key) {
        Ok(value) => non_empty(value),
        Err(error) => {
            warn!(key, error = %error, "token storage read failed; treating as signed out");
            None
        }
    }
}

fn persist_entry(storage: &dyn TokenStorage, key: &str, value: Option<&str>) {
    let result = match value {
        Some(value) => storage.write(key, value),
        None => storage.remove(key),
    };

    if let Err(error) = result {
        warn!(key, error = %error, "token storage write failed");
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Transport used by [`Authenticator`] to reach the token endpoint.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Submits the credential form and decodes the token response.
    async fn request_token(
        &self,
        endpoint: &Url,
        request: &LoginRequest,
    ) -> Result<TokenResponse, AuthError>;
}

/// `reqwest`-backed token endpoint client.
#[derive(Debug, Clone)]
pub struct HttpAuthTransport {
    client: reqwest::Client,
}

impl HttpAuthTransport {
    /// Wraps a shared HTTP client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthTransport for HttpAuthTransport {
    async fn request_token(
        &self,
        endpoint: &Url,
        request: &LoginRequest,
    ) -> Result<TokenResponse, AuthError> {
        let response = self
            .client
            .post(endpoint.clone())
            .form(request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    AuthError::Timeout
                } else {
                    AuthError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, body_len = body.len(), "token endpoint rejected login");
            return Err(AuthError::Rejected(status.as_u16()));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|error| AuthError::InvalidResponse(error.to_string()))
    }
}

/// Login flow bound to one session store and token endpoint.
#[derive(Clone)]
pub struct Authenticator {
    endpoint: Url,
    transport: Arc<dyn AuthTransport>,
    session: Arc<SessionStore>,
    timeout: Duration,
}

impl Authenticator {
    /// Creates a validated authenticator.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidEndpoint`] when the URL is not HTTP(S) or
    /// does not end with [`TOKEN_ENDPOINT_PATH`].
    pub fn new(
        endpoint: Url,
        transport: Arc<dyn AuthTransport>,
        session: Arc<SessionStore>,
    ) -> Result<Self, AuthError> {
        validate_auth_endpoint(&endpoint)?;
        Ok(Self {
            endpoint,
            transport,
            session,
            timeout: DEFAULT_LOGIN_TIMEOUT,
        })
    }

    /// Creates an authenticator for the token endpoint under `base_url`.
    ///
    /// # Errors
    /// See [`Authenticator::new`].
    pub fn for_base_url(
        base_url: &Url,
        transport: Arc<dyn AuthTransport>,
        session: Arc<SessionStore>,
    ) -> Result<Self, AuthError> {
        Self::new(join_api_path(base_url, TOKEN_ENDPOINT_PATH), transport, session)
    }

    /// Overrides the login timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured token endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Session store updated by this authenticator.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Runs the login flow and stores the tokens on success.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for blank input,
    /// [`AuthError::Timeout`] when the bound elapses, and transport/decode
    /// errors as reported. The session is only modified on success.
    pub async fn try_login(&self, credentials: &Credentials) -> Result<TokenPair, AuthError> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(AuthError::EmptyCredential);
        }

        let request = LoginRequest {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.transport.request_token(&self.endpoint, &request),
        )
        .await
        .map_err(|_| AuthError::Timeout)??;

        if response.access_token.trim().is_empty() {
            return Err(AuthError::InvalidResponse(
                "response missing access token".to_string(),
            ));
        }

        let tokens = TokenPair::from(response);
        self.session.save(&tokens);
        Ok(tokens)
    }

    /// Logs in and reports success as a boolean. Never fails.
    pub async fn login(&self, credentials: &Credentials) -> bool {
        match self.try_login(credentials).await {
            Ok(_) => {
                info!("login succeeded");
                true
            }
            Err(error) => {
                warn!(error = %error, "login failed");
                false
            }
        }
    }

    /// Logs in with the canned demo identity.
    pub async fn demo_login(&self) -> bool {
        let success = self.login(&Credentials::demo()).await;
        if !success {
            warn!("demo login returned false");
        }
        success
    }

    /// Makes one best-effort demo login when no session is held.
    ///
    /// Returns the authentication state afterwards.
    pub async fn ensure_authenticated(&self) -> bool {
        if self.session.is_authenticated() {
            return true;
        }

        info!("no session held; attempting demo login");
        if !self.demo_login().await {
            warn!("continuing unauthenticated; backend calls may be rejected");
        }
        self.session.is_authenticated()
    }

    /// Clears the session.
    pub fn logout(&self) {
        self.session.clear();
        info!("session cleared");
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Appends an absolute API path to a base URL, keeping any base path prefix.
pub fn join_api_path(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    let joined = format!(
        "{}/{}",
        base_url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Validates token endpoint constraints.
///
/// # Errors
/// Returns [`AuthError::InvalidEndpoint`] for non-HTTP(S) schemes or a path
/// that does not end with [`TOKEN_ENDPOINT_PATH`].
pub fn validate_auth_endpoint(endpoint: &Url) -> Result<(), AuthError> {
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(AuthError::InvalidEndpoint(format!(
            "unsupported scheme {}",
            endpoint.scheme()
        )));
    }

    if !endpoint.path().ends_with(TOKEN_ENDPOINT_PATH) {
        return Err(AuthError::InvalidEndpoint(format!(
            "auth endpoint path must end with {TOKEN_ENDPOINT_PATH}"
        )));
    }

    Ok(())
}

/// Errors produced by the login flow and token storage.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Endpoint violates scheme or path requirements.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Username or password missing.
    #[error("username and password must be non-empty")]
    EmptyCredential,
    /// Login did not finish within the configured bound.
    #[error("login timed out")]
    Timeout,
    /// Network-level failure.
    #[error("auth transport failure: {0}")]
    Transport(String),
    /// Token endpoint answered with a non-success status.
    #[error("login rejected with status {0}")]
    Rejected(u16),
    /// Response body violated the token contract.
    #[error("invalid auth response: {0}")]
    InvalidResponse(String),
    /// Token storage backend failed.
    #[error("token storage failure: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for endpoint policy and secret redaction.

    use super::*;

    #[test]
    fn validates_expected_endpoint_policy() {
        let valid = Url::parse("http://localhost:8000/api/v1/auth/login/access-token")
            .expect("url should parse");
        validate_auth_endpoint(&valid).expect("endpoint should pass");

        let wrong_path = Url::parse("https://example.test/api/v2/login").expect("url should parse");
        assert!(validate_auth_endpoint(&wrong_path).is_err());

        let wrong_scheme =
            Url::parse("ftp://example.test/api/v1/auth/login/access-token").expect("url");
        assert!(validate_auth_endpoint(&wrong_scheme).is_err());
    }

    #[test]
    fn join_keeps_base_prefix() {
        let base = Url::parse("https://example.test/proxy/").expect("url should parse");
        let joined = join_api_path(&base, TOKEN_ENDPOINT_PATH);
        assert_eq!(
            joined.as_str(),
            "https://example.test/proxy/api/v1/auth/login/access-token"
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", Credentials::new("user", "hunter2"));
        assert!(!rendered.contains("hunter2"));

        let rendered = format!("{:?}", TokenPair::new("secret-token", None));
        assert!(!rendered.contains("secret-token"));
    }
}
