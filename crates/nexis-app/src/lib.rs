#![warn(missing_docs)]
//! # nexis-app
//!
//! ## Purpose
//! Wires auth, upload, analysis polling, and UI state into the `nexis`
//! command-line client.
//!
//! ## Responsibilities
//! - Build every subsystem from one [`NexisConfig`].
//! - Run the upload -> analysis -> results flow for one file.
//! - Probe backend reachability and the demo login.
//! - Provide log redaction and the build-time version.
//!
//! ## Data flow
//! `nexis analyze <path>` -> [`NexisClient::analyze_path`] ->
//! [`AnalysisFlow::run`] (upload orchestrator, then poller or simulated
//! analysis steps) ->
//! [`FlowReport`] -> [`UiProjection`] -> terminal output.
//!
//! ## Ownership and lifetimes
//! [`NexisClient`] owns the single session store and shares it as
//! `Arc<SessionStore>` with the authenticator and both HTTP clients.
//!
//! ## Error model
//! Subsystem errors convert into [`AppError`] with `#[from]`; the binary
//! reports them through `anyhow`.
//!
//! ## Security and privacy notes
//! - Tokens live only in the session file and in request headers.
//! - [`redact_sensitive`] scrubs secrets from strings bound for logs or
//!   the terminal.

pub mod config;
mod connection;
mod flow;
mod observer;
pub mod telemetry;

use std::path::Path;
use std::sync::Arc;

use nexis_analysis::{
    AnalysisError, AnalysisPoller, HttpAnalysisApi, PollError, PollObserver, download_report_url,
};
use nexis_auth::{
    AuthError, Authenticator, Credentials, FileTokenStorage, HttpAuthTransport, SessionStore,
};
use nexis_core::{CoreError, MediaFile};
use nexis_mock::{AnalysisStepObserver, MockEngine};
use nexis_upload::{HttpMediaTransport, OrchestratorError, UploadObserver, UploadOrchestrator};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use config::{NexisConfig, TimeoutConfig, load_config, load_config_from_path, load_config_from_str};
pub use connection::{API_ROOT_PATH, ConnectionReport, check_connection};
pub use flow::{AnalysisFlow, FlowOutcome, FlowReport, UNTRACKED_ANALYSIS_REASON};
pub use observer::UiProjection;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("NEXIS_VERSION");

/// Placeholder written over secret values.
pub const REDACTED: &str = "<redacted>";

const SECRET_KEYS: [&str; 4] = ["password", "token", "authorization", "secret"];

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Replaces secret values in `input` with [`REDACTED`].
///
/// Handles `key=value`, `key: value`, JSON-style `"key":"value"`, and
/// `Bearer <token>` forms. Non-secret words are kept as is.
pub fn redact_sensitive(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut redact_next = false;

    for piece in input.split_inclusive(char::is_whitespace) {
        let word = piece.trim_end();
        let trailing = &piece[word.len()..];

        if word.is_empty() {
            output.push_str(piece);
            continue;
        }

        let lower = word.to_ascii_lowercase();
        if lower.trim_matches(|c: char| !c.is_ascii_alphanumeric()) == "bearer" {
            output.push_str(piece);
            redact_next = true;
            continue;
        }

        if redact_next {
            output.push_str(REDACTED);
            output.push_str(trailing);
            redact_next = false;
            continue;
        }

        match secret_value_start(&lower) {
            Some(value_start) => {
                let value = word[value_start..].trim_matches(|c| matches!(c, '"' | '\'' | ','));
                output.push_str(&word[..value_start]);
                if value.is_empty() {
                    redact_next = true;
                } else if value.eq_ignore_ascii_case("bearer") {
                    output.push_str(&word[value_start..]);
                    redact_next = true;
                } else {
                    output.push_str(REDACTED);
                }
                output.push_str(trailing);
            }
            None => output.push_str(piece),
        }
    }

    output
}

/// Byte offset just past `key=`, `key:` or `"key":` in a lowercased word.
fn secret_value_start(lower: &str) -> Option<usize> {
    SECRET_KEYS.iter().find_map(|key| {
        let position = lower.find(key)?;
        let mut cursor = position + key.len();
        if lower[cursor..].starts_with('"') {
            cursor += 1;
        }
        matches!(lower[cursor..].chars().next(), Some('=' | ':')).then_some(cursor + 1)
    })
}

/// Fully wired client: session, login, upload flow, download, connection check.
pub struct NexisClient {
    config: NexisConfig,
    base_url: Url,
    http: reqwest::Client,
    authenticator: Arc<Authenticator>,
    analysis_api: Arc<HttpAnalysisApi>,
    flow: AnalysisFlow,
}

impl NexisClient {
    /// Builds a client whose session persists to `config.session_path`.
    ///
    /// # Errors
    /// Returns [`AppError::InvalidConfig`] for bad settings and
    /// [`AppError::Http`] when the HTTP client cannot be built.
    pub fn from_config(config: NexisConfig) -> Result<Self, AppError> {
        let storage = Arc::new(FileTokenStorage::new(config.session_path.clone()));
        Self::with_session(config, Arc::new(SessionStore::open(storage)))
    }

    /// Builds a client around an existing session store.
    ///
    /// # Errors
    /// See [`NexisClient::from_config`].
    pub fn with_session(config: NexisConfig, session: Arc<SessionStore>) -> Result<Self, AppError> {
        config.validate()?;
        let base_url = config.base_url()?;
        let http = reqwest::Client::builder()
            .user_agent(format!("nexis/{APP_VERSION}"))
            .build()?;

        let authenticator = Arc::new(
            Authenticator::for_base_url(
                &base_url,
                Arc::new(HttpAuthTransport::new(http.clone())),
                session.clone(),
            )?
            .with_timeout(config.login_timeout()),
        );

        let transport = Arc::new(HttpMediaTransport::new(
            http.clone(),
            base_url.clone(),
            session.clone(),
        ));
        let mock = Arc::new(MockEngine::new(config.mock_timing()));
        let orchestrator = UploadOrchestrator::new(transport, authenticator.clone(), mock.clone())
            .with_timeouts(config.upload_timeouts());

        let analysis_api = Arc::new(
            HttpAnalysisApi::new(http.clone(), base_url.clone(), session)
                .with_request_timeout(config.upload_timeouts().trigger),
        );
        let poller = AnalysisPoller::new(analysis_api.clone()).with_interval(config.poll_interval());

        Ok(Self {
            config,
            base_url,
            http,
            authenticator,
            analysis_api,
            flow: AnalysisFlow::new(orchestrator, poller, mock),
        })
    }

    /// Effective configuration.
    pub fn config(&self) -> &NexisConfig {
        &self.config
    }

    /// Backend root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Shared session store.
    pub fn session(&self) -> &Arc<SessionStore> {
        self.authenticator.session()
    }

    /// Returns `true` when a token is held.
    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    /// Logs in; `false` on any failure, leaving the prior session intact.
    pub async fn login(&self, credentials: &Credentials) -> bool {
        self.authenticator.login(credentials).await
    }

    /// Logs in with the demo identity.
    pub async fn demo_login(&self) -> bool {
        self.authenticator.demo_login().await
    }

    /// Clears the session.
    pub fn logout(&self) {
        self.authenticator.logout();
    }

    /// Loads, validates and analyzes a file from disk.
    ///
    /// # Errors
    /// Returns [`AppError::Core`] for unreadable or unsupported files before
    /// any network call, and flow errors as [`AnalysisFlow::run`] does.
    pub async fn analyze_path<O>(
        &self,
        path: &Path,
        observer: &O,
        cancel: &CancellationToken,
    ) -> Result<FlowReport, AppError>
    where
        O: UploadObserver + PollObserver + AnalysisStepObserver,
    {
        let file = MediaFile::from_path(path)?;
        self.analyze(file, observer, cancel).await
    }

    /// Analyzes an already validated file.
    ///
    /// # Errors
    /// See [`AnalysisFlow::run`].
    pub async fn analyze<O>(
        &self,
        file: MediaFile,
        observer: &O,
        cancel: &CancellationToken,
    ) -> Result<FlowReport, AppError>
    where
        O: UploadObserver + PollObserver + AnalysisStepObserver,
    {
        self.flow.run(file, observer, cancel).await
    }

    /// Resolves the report download link for `file_id`.
    ///
    /// # Errors
    /// Returns [`AppError::Analysis`] when the route fails.
    pub async fn download_report(&self, file_id: i64) -> Result<Url, AppError> {
        Ok(download_report_url(self.analysis_api.as_ref(), file_id).await?)
    }

    /// Probes the API root and the demo login without touching the session.
    pub async fn check_connection(&self) -> ConnectionReport {
        check_connection(&self.http, &self.base_url, self.config.login_timeout()).await
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] figment::Error),
    /// Configuration loaded but holds an unusable value.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// HTTP client construction failed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    /// Auth subsystem error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// File validation or task state error.
    #[error("media error: {0}")]
    Core(#[from] CoreError),
    /// Upload run ended without an outcome.
    #[error("upload error: {0}")]
    Upload(#[from] OrchestratorError),
    /// Analysis route error.
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),
    /// Polling ended without a result.
    #[error("poll error: {0}")]
    Poll(#[from] PollError),
    /// Caller cancelled the flow.
    #[error("cancelled")]
    Cancelled,
}
