//! Upload followed by analysis tracking for one file.

use std::fmt;
use std::sync::Arc;

use nexis_analysis::{AnalysisPoller, PollError, PollObserver};
use nexis_analysis_contract::{AnalysisResult, AnalysisStatus};
use nexis_core::{MediaFile, UploadPhase, UploadTask};
use nexis_mock::{AnalysisStepObserver, MockEngine};
use nexis_upload::{OrchestratorError, UploadObserver, UploadOrchestrator, UploadOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{AppError, redact_sensitive};

/// Where the final result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Backend analysis.
    Real,
    /// Simulated after a backend failure.
    Mocked {
        /// Why the backend path was abandoned.
        reason: String,
    },
}

/// Terminal result of one analyzed file.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    /// Backend or simulated result.
    pub outcome: FlowOutcome,
    /// Media id the result belongs to.
    pub media_id: Option<i64>,
    /// Terminal analysis result.
    pub result: AnalysisResult,
    /// SHA-256 of the submitted bytes.
    pub fingerprint: String,
}

impl FlowReport {
    /// Returns `true` when the simulated path produced the result.
    pub fn is_mocked(&self) -> bool {
        matches!(self.outcome, FlowOutcome::Mocked { .. })
    }
}

/// Reason reported when the backend accepts an upload but gives no
/// analysis to follow.
pub const UNTRACKED_ANALYSIS_REASON: &str = "backend accepted the upload without an analysis id";

/// Runs the upload orchestrator and, for real uploads, polls the analysis
/// to a terminal status. Simulated results are preceded by the simulated
/// analysis steps.
pub struct AnalysisFlow {
    orchestrator: UploadOrchestrator,
    poller: AnalysisPoller,
    mock: Arc<MockEngine>,
}

impl AnalysisFlow {
    /// Combines an orchestrator, a poller and the fallback engine.
    pub fn new(
        orchestrator: UploadOrchestrator,
        poller: AnalysisPoller,
        mock: Arc<MockEngine>,
    ) -> Self {
        Self {
            orchestrator,
            poller,
            mock,
        }
    }

    /// Takes `file` from submission to a terminal result.
    ///
    /// Poll failures end the flow with a `failed` result instead of an error.
    /// A trigger that returns no analysis id is completed by the simulated
    /// analysis, as is every upload the orchestrator moved to the mock path.
    ///
    /// # Errors
    /// Returns [`AppError::Cancelled`] when `cancel` fires during upload,
    /// simulated analysis or polling, and [`AppError::Core`] for task state
    /// violations.
    pub async fn run<O>(
        &self,
        file: MediaFile,
        observer: &O,
        cancel: &CancellationToken,
    ) -> Result<FlowReport, AppError>
    where
        O: UploadObserver + PollObserver + AnalysisStepObserver,
    {
        let fingerprint = file.fingerprint();
        info!(fingerprint = %fingerprint, kind = ?file.kind(), size = file.size(), "analysis flow started");

        let mut task = UploadTask::new(file);
        let outcome = match self.orchestrator.run(&mut task, observer, cancel).await {
            Ok(outcome) => outcome,
            Err(OrchestratorError::Cancelled) => return Err(AppError::Cancelled),
            Err(error) => return Err(error.into()),
        };

        let (media_id, initial) = match outcome {
            UploadOutcome::Mocked { reason, result } => {
                if !self.mock.play_analysis_steps(observer, cancel).await {
                    return Err(abandon(&mut task, observer));
                }
                info!(fingerprint = %fingerprint, reason = %redact_sensitive(&reason), "simulated result produced");
                observer.on_status(&result);
                return Ok(FlowReport {
                    outcome: FlowOutcome::Mocked { reason },
                    media_id: result.media_id,
                    result,
                    fingerprint,
                });
            }
            UploadOutcome::Uploaded { media_id, analysis } => (media_id, analysis),
        };

        if initial.is_terminal() {
            observer.on_status(&initial);
            return Ok(FlowReport {
                outcome: FlowOutcome::Real,
                media_id: Some(media_id),
                result: initial,
                fingerprint,
            });
        }

        if initial.analysis_id.is_none() {
            warn!(media_id, "{UNTRACKED_ANALYSIS_REASON}; simulating analysis");
            let Some(mut result) = self
                .mock
                .simulate_analysis_steps(task.file(), observer, cancel)
                .await
            else {
                return Err(abandon(&mut task, observer));
            };
            result.media_id = Some(media_id);
            observer.on_status(&result);
            info!(fingerprint = %fingerprint, media_id, "simulated result produced");
            return Ok(FlowReport {
                outcome: FlowOutcome::Mocked {
                    reason: UNTRACKED_ANALYSIS_REASON.to_string(),
                },
                media_id: Some(media_id),
                result,
                fingerprint,
            });
        }

        task.transition(UploadPhase::Polling)?;
        observer.on_phase(UploadPhase::Polling);

        let mut result = match self.poller.track(initial, observer, cancel).await {
            Ok(result) => result,
            Err(PollError::Cancelled) => return Err(abandon(&mut task, observer)),
            Err(error) => {
                warn!(media_id, error = %redact_sensitive(&error.to_string()), "analysis tracking failed");
                let failed = AnalysisResult::failed(error.to_string());
                observer.on_status(&failed);
                failed
            }
        };
        result.media_id.get_or_insert(media_id);

        let terminal = match result.status {
            AnalysisStatus::Completed => UploadPhase::Completed,
            _ => UploadPhase::Failed,
        };
        task.transition(terminal)?;
        observer.on_phase(terminal);
        info!(media_id, status = ?result.status, "analysis flow finished");

        Ok(FlowReport {
            outcome: FlowOutcome::Real,
            media_id: Some(media_id),
            result,
            fingerprint,
        })
    }
}

fn abandon(task: &mut UploadTask, observer: &dyn UploadObserver) -> AppError {
    task.reset();
    observer.on_phase(UploadPhase::Idle);
    AppError::Cancelled
}

impl fmt::Debug for AnalysisFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisFlow")
            .field("orchestrator", &self.orchestrator)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}
