//! Upload state machine: slot -> transfer -> trigger, with simulated fallback.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nexis_auth::Authenticator;
use nexis_core::{
    PROGRESS_COMPLETE, PROGRESS_SLOT_ACQUIRED, PROGRESS_TRANSFERRED, UploadPhase, UploadTask,
    transfer_progress,
};
use nexis_mock::MockEngine;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::{
    ByteProgress, CompletionNotice, MediaTransport, OrchestratorError, ServiceOutcome,
    UploadError, UploadObserver, UploadOutcome,
};

/// Per-step time bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTimeouts {
    /// Upload slot request.
    pub slot: Duration,
    /// Byte transfer.
    pub transfer: Duration,
    /// Analysis trigger.
    pub trigger: Duration,
}

impl Default for UploadTimeouts {
    fn default() -> Self {
        Self {
            slot: Duration::from_secs(15),
            transfer: Duration::from_secs(30),
            trigger: Duration::from_secs(15),
        }
    }
}

/// Drives one [`UploadTask`] to a terminal phase.
pub struct UploadOrchestrator {
    transport: Arc<dyn MediaTransport>,
    authenticator: Arc<Authenticator>,
    mock: Arc<MockEngine>,
    timeouts: UploadTimeouts,
}

impl UploadOrchestrator {
    /// Creates an orchestrator with default timeouts.
    pub fn new(
        transport: Arc<dyn MediaTransport>,
        authenticator: Arc<Authenticator>,
        mock: Arc<MockEngine>,
    ) -> Self {
        Self {
            transport,
            authenticator,
            mock,
            timeouts: UploadTimeouts::default(),
        }
    }

    /// Overrides the per-step timeouts.
    pub fn with_timeouts(mut self, timeouts: UploadTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Step timeouts in use.
    pub fn timeouts(&self) -> UploadTimeouts {
        self.timeouts
    }

    /// Runs the upload pipeline for an idle task.
    ///
    /// Progress is reported through `observer` and never decreases. The
    /// completion notice fires exactly once, whether the backend or the
    /// simulated path finishes the task.
    ///
    /// # Errors
    /// Returns [`OrchestratorError::Core`] when the task is not idle and
    /// [`OrchestratorError::Cancelled`] when `cancel` fires; a cancelled task
    /// is reset to idle and no completion notice is emitted.
    pub async fn run(
        &self,
        task: &mut UploadTask,
        observer: &dyn UploadObserver,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, OrchestratorError> {
        let span = info_span!("upload", kind = ?task.file().kind(), size = task.file().size());
        self.run_steps(task, observer, cancel).instrument(span).await
    }

    async fn run_steps(
        &self,
        task: &mut UploadTask,
        observer: &dyn UploadObserver,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, OrchestratorError> {
        enter(task, observer, UploadPhase::RequestingSlot)?;

        let authenticated = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            state = self.authenticator.ensure_authenticated() => Some(state),
        };
        match authenticated {
            None => return cancelled(task, observer),
            Some(false) => debug!("requesting slot without a session"),
            Some(true) => {}
        }

        let slot_request = self.transport.request_upload_slot(task.file());
        let slot = match bounded(cancel, self.timeouts.slot, slot_request).await {
            None => return cancelled(task, observer),
            Some(ServiceOutcome::Ok(slot)) => slot,
            Some(failure) => return self.fall_back(task, observer, cancel, failure).await,
        };
        task.set_remote_media_id(slot.media_id);
        report_progress(task, observer, PROGRESS_SLOT_ACQUIRED);
        info!(media_id = slot.media_id, "upload slot acquired");

        enter(task, observer, UploadPhase::Transferring)?;
        let file = task.file().clone();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(u64, u64)>();
        let sink: ByteProgress = Arc::new(move |loaded, total| {
            let _ = progress_tx.send((loaded, total));
        });
        let transfer = tokio::time::timeout(
            self.timeouts.transfer,
            self.transport.transfer(&slot, &file, sink),
        );
        tokio::pin!(transfer);

        let transferred = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                Some((loaded, total)) = progress_rx.recv() => {
                    report_progress(task, observer, transfer_progress(loaded, total));
                }
                result = &mut transfer => {
                    break Some(ServiceOutcome::from(
                        result.unwrap_or_else(|_| Err(UploadError::Timeout)),
                    ));
                }
            }
        };
        while let Ok((loaded, total)) = progress_rx.try_recv() {
            report_progress(task, observer, transfer_progress(loaded, total));
        }
        match transferred {
            None => return cancelled(task, observer),
            Some(ServiceOutcome::Ok(())) => {}
            Some(failure) => return self.fall_back(task, observer, cancel, failure).await,
        }
        report_progress(task, observer, PROGRESS_TRANSFERRED);

        enter(task, observer, UploadPhase::TriggeringAnalysis)?;
        let trigger = self.transport.trigger_analysis(slot.media_id);
        let analysis = match bounded(cancel, self.timeouts.trigger, trigger).await {
            None => return cancelled(task, observer),
            Some(ServiceOutcome::Ok(analysis)) => analysis,
            Some(failure) => return self.fall_back(task, observer, cancel, failure).await,
        };
        report_progress(task, observer, PROGRESS_COMPLETE);

        enter(task, observer, UploadPhase::Completed)?;
        notify_once(task, observer, slot.media_id, false);
        info!(media_id = slot.media_id, status = ?analysis.status, "analysis triggered");

        Ok(UploadOutcome::Uploaded {
            media_id: slot.media_id,
            analysis,
        })
    }

    async fn fall_back<T>(
        &self,
        task: &mut UploadTask,
        observer: &dyn UploadObserver,
        cancel: &CancellationToken,
        failure: ServiceOutcome<T>,
    ) -> Result<UploadOutcome, OrchestratorError> {
        let reason = match failure {
            ServiceOutcome::ServiceUnavailable(reason) => {
                warn!(phase = %task.phase(), reason = %reason, "backend unavailable; switching to mock");
                reason
            }
            ServiceOutcome::HardFailure(reason) => {
                error!(phase = %task.phase(), reason = %reason, "backend step failed; switching to mock");
                reason
            }
            ServiceOutcome::Ok(_) => "backend step returned no usable result".to_string(),
        };

        enter(task, observer, UploadPhase::Mocked)?;

        let start = task.progress();
        let interrupted = {
            let simulation = self.mock.simulate_upload(start, |checkpoint| {
                if let Some(percent) = task.advance_progress(checkpoint) {
                    observer.on_progress(percent);
                }
            });
            tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = simulation => false,
            }
        };
        if interrupted {
            return cancelled(task, observer);
        }

        let mut result = self.mock.simulate_analysis(task.file());
        let media_id = task
            .remote_media_id()
            .or(result.media_id)
            .unwrap_or_else(|| self.mock.mock_media_id());
        result.media_id = Some(media_id);
        notify_once(task, observer, media_id, true);

        Ok(UploadOutcome::Mocked { reason, result })
    }
}

impl fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

/// Runs one backend step under a timeout; `None` means cancelled.
async fn bounded<T>(
    cancel: &CancellationToken,
    limit: Duration,
    step: impl Future<Output = Result<T, UploadError>>,
) -> Option<ServiceOutcome<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(limit, step) => {
            Some(ServiceOutcome::from(result.unwrap_or_else(|_| Err(UploadError::Timeout))))
        }
    }
}

fn enter(
    task: &mut UploadTask,
    observer: &dyn UploadObserver,
    phase: UploadPhase,
) -> Result<(), OrchestratorError> {
    task.transition(phase)?;
    debug!(phase = %phase, "upload phase");
    observer.on_phase(phase);
    Ok(())
}

fn report_progress(task: &mut UploadTask, observer: &dyn UploadObserver, percent: u8) {
    if let Some(percent) = task.advance_progress(percent) {
        observer.on_progress(percent);
    }
}

fn notify_once(task: &mut UploadTask, observer: &dyn UploadObserver, media_id: i64, mocked: bool) {
    if task.mark_notified() {
        observer.on_complete(&CompletionNotice {
            file: task.file().clone(),
            media_id,
            mocked,
        });
    }
}

fn cancelled(
    task: &mut UploadTask,
    observer: &dyn UploadObserver,
) -> Result<UploadOutcome, OrchestratorError> {
    info!(phase = %task.phase(), "upload cancelled");
    task.reset();
    observer.on_phase(UploadPhase::Idle);
    Err(OrchestratorError::Cancelled)
}
