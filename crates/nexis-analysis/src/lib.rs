#![warn(missing_docs)]
//! # nexis-analysis
//!
//! ## Purpose
//! Starts backend analyses, follows them to a terminal status, and resolves
//! report download links.
//!
//! ## Responsibilities
//! - Expose the analysis routes through an injectable [`AnalysisApi`].
//! - Poll one analysis on a fixed interval with at most one request in
//!   flight, stopping on a terminal status, an error, or cancellation.
//!
//! ## Data flow
//! Trigger payload -> [`AnalysisPoller::track`] -> repeated
//! [`AnalysisApi::analysis_status`] -> terminal [`AnalysisResult`].
//!
//! ## Ownership and lifetimes
//! The poller owns its ticker for the duration of one call; nothing is left
//! scheduled after the call returns.
//!
//! ## Error model
//! Transport and contract failures are [`AnalysisError`]. Polling wraps
//! them in [`PollError`] and never retries.
//!
//! ## Security and privacy notes
//! Requests carry the session bearer token; presigned URLs are returned to
//! the caller but not logged.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nexis_analysis_contract::{
    AnalysisContractError, AnalysisResult, AnalysisTrigger, PresignedDownload,
    parse_analysis_result,
};
use nexis_auth::{SessionStore, join_api_path};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Route that starts an analysis.
pub const ANALYSIS_TRIGGER_PATH: &str = "/api/v1/media/analyze";
/// Prefix of the analysis status route (`/api/analyses/{id}`).
pub const ANALYSIS_STATUS_PREFIX: &str = "/api/analyses";
/// Prefix of the report download route (`/api/files/{id}/download`).
pub const FILE_DOWNLOAD_PREFIX: &str = "/api/files";
/// Default pause between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Shortest poll interval accepted by [`AnalysisPoller::with_interval`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Default per-request timeout for analysis routes.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend analysis operations.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Starts analysis of an uploaded media file.
    async fn start_analysis(&self, media_id: i64) -> Result<AnalysisResult, AnalysisError>;

    /// Fetches the current state of one analysis.
    async fn analysis_status(&self, analysis_id: i64) -> Result<AnalysisResult, AnalysisError>;

    /// Resolves a time-limited download URL for a file.
    async fn download_url(&self, file_id: i64) -> Result<String, AnalysisError>;
}

/// `reqwest`-backed [`AnalysisApi`].
#[derive(Clone)]
pub struct HttpAnalysisApi {
    client: reqwest::Client,
    base_url: Url,
    session: Arc<SessionStore>,
    request_timeout: Duration,
}

impl HttpAnalysisApi {
    /// Creates an API client rooted at `base_url`.
    pub fn new(client: reqwest::Client, base_url: Url, session: Arc<SessionStore>) -> Self {
        Self {
            client,
            base_url,
            session,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Overrides the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<String, AnalysisError> {
        let response = request
            .headers(self.session.auth_headers())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status, "analysis route rejected request");
            return Err(AnalysisError::Status(status.as_u16()));
        }

        response.text().await.map_err(map_request_error)
    }
}

impl fmt::Debug for HttpAnalysisApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAnalysisApi")
            .field("base_url", &self.base_url.as_str())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AnalysisApi for HttpAnalysisApi {
    async fn start_analysis(&self, media_id: i64) -> Result<AnalysisResult, AnalysisError> {
        let url = join_api_path(&self.base_url, ANALYSIS_TRIGGER_PATH);
        let body = self
            .fetch(self.client.post(url).json(&AnalysisTrigger { media_id }))
            .await?;

        if body.trim().is_empty() {
            return Ok(AnalysisResult::pending(media_id));
        }
        let mut result = parse_analysis_result(&body)?;
        result.media_id.get_or_insert(media_id);
        Ok(result)
    }

    async fn analysis_status(&self, analysis_id: i64) -> Result<AnalysisResult, AnalysisError> {
        let url = join_api_path(
            &self.base_url,
            &format!("{ANALYSIS_STATUS_PREFIX}/{analysis_id}"),
        );
        let body = self.fetch(self.client.get(url)).await?;
        let mut result = parse_analysis_result(&body)?;
        result.analysis_id.get_or_insert(analysis_id);
        Ok(result)
    }

    async fn download_url(&self, file_id: i64) -> Result<String, AnalysisError> {
        let url = join_api_path(
            &self.base_url,
            &format!("{FILE_DOWNLOAD_PREFIX}/{file_id}/download"),
        );
        let body = self.fetch(self.client.get(url)).await?;
        let download: PresignedDownload = serde_json::from_str(&body)
            .map_err(|error| AnalysisError::InvalidResponse(error.to_string()))?;
        Ok(download.presigned_url)
    }
}

/// Resolves the report download link for `file_id`.
///
/// # Errors
/// Propagates API failures and rejects a blank or non-HTTP(S) URL with
/// [`AnalysisError::InvalidResponse`].
pub async fn download_report_url(
    api: &dyn AnalysisApi,
    file_id: i64,
) -> Result<Url, AnalysisError> {
    let raw = api.download_url(file_id).await?;
    let url = Url::parse(raw.trim())
        .map_err(|error| AnalysisError::InvalidResponse(format!("presigned_url: {error}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AnalysisError::InvalidResponse(format!(
            "presigned_url has unsupported scheme {}",
            url.scheme()
        )));
    }
    debug!(file_id, "download link resolved");
    Ok(url)
}

/// Receives every status observed while polling.
pub trait PollObserver: Send + Sync {
    /// Called once per successful poll, terminal status included.
    fn on_status(&self, result: &AnalysisResult);
}

impl<F> PollObserver for F
where
    F: Fn(&AnalysisResult) + Send + Sync,
{
    fn on_status(&self, result: &AnalysisResult) {
        self(result)
    }
}

/// Follows analyses to a terminal status.
pub struct AnalysisPoller {
    api: Arc<dyn AnalysisApi>,
    interval: Duration,
}

impl AnalysisPoller {
    /// Creates a poller with the default interval.
    pub fn new(api: Arc<dyn AnalysisApi>) -> Self {
        Self {
            api,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval, raised to at least
    /// [`MIN_POLL_INTERVAL`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Poll interval in use.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls `analysis_id` until it reports `completed` or `failed`.
    ///
    /// The first request goes out one interval after the call. Requests are
    /// strictly sequential, and a slow request delays the next tick instead
    /// of bunching them.
    ///
    /// # Errors
    /// Returns [`PollError::Analysis`] for the first failed poll and
    /// [`PollError::Cancelled`] when `cancel` fires.
    pub async fn poll_until_terminal(
        &self,
        analysis_id: i64,
        observer: &dyn PollObserver,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PollError> {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = 0_u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(analysis_id, polls)),
                _ = ticker.tick() => {}
            }

            polls += 1;
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(analysis_id, polls)),
                response = self.api.analysis_status(analysis_id) => response,
            };

            match response {
                Ok(result) => {
                    debug!(analysis_id, polls, status = ?result.status, "analysis polled");
                    observer.on_status(&result);
                    if result.is_terminal() {
                        info!(analysis_id, polls, status = ?result.status, "analysis finished");
                        return Ok(result);
                    }
                }
                Err(error) => {
                    warn!(analysis_id, polls, error = %error, "analysis poll failed; polling stopped");
                    return Err(PollError::Analysis(error));
                }
            }
        }
    }

    /// Follows an analysis from its trigger payload.
    ///
    /// A terminal payload is returned as is without any request.
    ///
    /// # Errors
    /// Returns [`PollError::MissingAnalysisId`] when a non-terminal payload
    /// carries no id, plus everything [`Self::poll_until_terminal`] returns.
    pub async fn track(
        &self,
        initial: AnalysisResult,
        observer: &dyn PollObserver,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PollError> {
        if initial.is_terminal() {
            return Ok(initial);
        }
        let analysis_id = initial.analysis_id.ok_or(PollError::MissingAnalysisId)?;
        observer.on_status(&initial);
        self.poll_until_terminal(analysis_id, observer, cancel).await
    }

    fn cancelled(&self, analysis_id: i64, polls: u32) -> PollError {
        info!(analysis_id, polls, "analysis polling cancelled");
        PollError::Cancelled
    }
}

impl fmt::Debug for AnalysisPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisPoller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

fn map_request_error(error: reqwest::Error) -> AnalysisError {
    if error.is_timeout() {
        AnalysisError::Timeout
    } else {
        AnalysisError::Transport(error.to_string())
    }
}

/// Errors from the analysis routes.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Non-success HTTP status.
    #[error("analysis route returned status {0}")]
    Status(u16),
    /// Request exceeded its timeout.
    #[error("analysis request timed out")]
    Timeout,
    /// Connection-level failure.
    #[error("analysis transport failure: {0}")]
    Transport(String),
    /// Analysis payload violated the contract.
    #[error(transparent)]
    Contract(#[from] AnalysisContractError),
    /// Other malformed response.
    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),
}

/// Errors that end polling early.
#[derive(Debug, Error)]
pub enum PollError {
    /// A poll request failed.
    #[error("analysis poll failed: {0}")]
    Analysis(#[from] AnalysisError),
    /// A non-terminal payload had no analysis id to poll.
    #[error("analysis payload has no analysis_id")]
    MissingAnalysisId,
    /// Caller abandoned the analysis.
    #[error("analysis polling cancelled")]
    Cancelled,
}
