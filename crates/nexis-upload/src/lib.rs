#![warn(missing_docs)]
//! # nexis-upload
//!
//! ## Purpose
//! Moves one media file from local memory to the backend and starts its
//! analysis, falling back to the simulated path whenever the backend cannot
//! be used.
//!
//! ## Responsibilities
//! - Request an upload slot, stream the bytes, and trigger analysis through
//!   an injectable [`MediaTransport`].
//! - Classify transport failures into a [`ServiceOutcome`] tag.
//! - Drive the [`nexis_core::UploadTask`] state machine and report progress
//!   through an [`UploadObserver`].
//!
//! ## Data flow
//! [`UploadOrchestrator::run`] -> slot request -> byte transfer -> analysis
//! trigger -> [`UploadOutcome::Uploaded`]. Any failed step ->
//! [`nexis_mock::MockEngine`] -> [`UploadOutcome::Mocked`].
//!
//! ## Ownership and lifetimes
//! The caller owns the task; the orchestrator borrows it mutably for one run
//! and clones the file handle (a cheap `Bytes` clone) for the transfer.
//!
//! ## Error model
//! Backend failures never reach the caller; they select the mock path.
//! Only validation problems and cancellation surface as
//! [`OrchestratorError`].
//!
//! ## Security and privacy notes
//! Bearer tokens are attached by the transport from the shared session store
//! and are never logged.

mod orchestrator;
mod transport;

use nexis_analysis::AnalysisError;
use nexis_analysis_contract::AnalysisResult;
use nexis_core::{CoreError, MediaFile, UploadPhase};
use thiserror::Error;

pub use orchestrator::{UploadOrchestrator, UploadTimeouts};
pub use transport::{
    ByteProgress, HttpMediaTransport, MediaTransport, TRANSFER_CHUNK_BYTES, UPLOAD_SLOT_PATH,
};

/// Failure reported by one backend step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Route answered 404; the service is not deployed.
    #[error("service not found (404)")]
    ServiceAbsent,
    /// Non-404 client error status.
    #[error("client error status {0}")]
    Client(u16),
    /// Server error status.
    #[error("server error status {0}")]
    Server(u16),
    /// Step exceeded its time bound.
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure.
    #[error("network failure: {0}")]
    Network(String),
    /// Response body violated the contract.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Maps a non-success HTTP status to an error.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => Self::ServiceAbsent,
            500..=599 => Self::Server(status),
            _ => Self::Client(status),
        }
    }
}

impl From<AnalysisError> for UploadError {
    fn from(error: AnalysisError) -> Self {
        match error {
            AnalysisError::Status(status) => Self::from_status(status),
            AnalysisError::Timeout => Self::Timeout,
            AnalysisError::Transport(reason) => Self::Network(reason),
            AnalysisError::Contract(error) => Self::InvalidResponse(error.to_string()),
            AnalysisError::InvalidResponse(reason) => Self::InvalidResponse(reason),
        }
    }
}

/// Coarse failure category used for fallback policy and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Backend is absent, overloaded, or unreachable.
    ServiceUnavailable,
    /// Backend answered but refused the request or broke the contract.
    HardFailure,
}

/// Classifies an upload error.
pub fn classify_upload_error(error: &UploadError) -> FailureClass {
    match error {
        UploadError::ServiceAbsent
        | UploadError::Server(_)
        | UploadError::Timeout
        | UploadError::Network(_) => FailureClass::ServiceUnavailable,
        UploadError::Client(_) | UploadError::InvalidResponse(_) => FailureClass::HardFailure,
    }
}

/// Tagged result of one backend step.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceOutcome<T> {
    /// Step succeeded.
    Ok(T),
    /// Backend unavailable; the reason is for logs only.
    ServiceUnavailable(String),
    /// Backend refused or answered garbage; the reason is for logs only.
    HardFailure(String),
}

impl<T> ServiceOutcome<T> {
    /// Returns `true` for [`ServiceOutcome::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl<T> From<Result<T, UploadError>> for ServiceOutcome<T> {
    fn from(result: Result<T, UploadError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(error) => match classify_upload_error(&error) {
                FailureClass::ServiceUnavailable => Self::ServiceUnavailable(error.to_string()),
                FailureClass::HardFailure => Self::HardFailure(error.to_string()),
            },
        }
    }
}

/// Caller-facing notification emitted once per task when the upload
/// pipeline (real or simulated) reaches 100%.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionNotice {
    /// The file that was submitted.
    pub file: MediaFile,
    /// Backend or simulated media id.
    pub media_id: i64,
    /// `true` when the simulated path produced the completion.
    pub mocked: bool,
}

/// Receives task progress. All methods default to no-ops.
pub trait UploadObserver: Send + Sync {
    /// Task entered `phase`.
    fn on_phase(&self, _phase: UploadPhase) {}
    /// Overall progress increased to `percent`.
    fn on_progress(&self, _percent: u8) {}
    /// Upload pipeline finished; fires at most once per task.
    fn on_complete(&self, _notice: &CompletionNotice) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

/// Terminal result of [`UploadOrchestrator::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The backend accepted the file and started analysis.
    Uploaded {
        /// Backend media id.
        media_id: i64,
        /// Initial analysis payload returned by the trigger.
        analysis: AnalysisResult,
    },
    /// The simulated path finished the task.
    Mocked {
        /// Why the backend path was abandoned.
        reason: String,
        /// Simulated analysis result.
        result: AnalysisResult,
    },
}

impl UploadOutcome {
    /// Returns `true` for [`UploadOutcome::Mocked`].
    pub fn is_mocked(&self) -> bool {
        matches!(self, Self::Mocked { .. })
    }

    /// Media id the outcome refers to.
    pub fn media_id(&self) -> Option<i64> {
        match self {
            Self::Uploaded { media_id, .. } => Some(*media_id),
            Self::Mocked { result, .. } => result.media_id,
        }
    }
}

/// Errors that escape the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Task was not in a state that allows a new run.
    #[error("task rejected: {0}")]
    Core(#[from] CoreError),
    /// Caller cancelled the run; the task was reset to idle.
    #[error("upload cancelled")]
    Cancelled,
}
