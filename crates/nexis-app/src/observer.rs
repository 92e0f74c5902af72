//! Feeds upload, simulated analysis and poll events into a shared
//! [`UiState`].

use std::fmt;
use std::sync::{Mutex, PoisonError};

use nexis_analysis::PollObserver;
use nexis_analysis_contract::AnalysisResult;
use nexis_core::UploadPhase;
use nexis_mock::{AnalysisStepObserver, AnalysisStepProgress};
use nexis_ui::UiState;
use nexis_upload::{CompletionNotice, UploadObserver};

type Listener = Box<dyn Fn(&UiState) + Send + Sync>;

/// Observer that keeps a [`UiState`] current and optionally reports every
/// change to a listener.
pub struct UiProjection {
    state: Mutex<UiState>,
    listener: Option<Listener>,
}

impl UiProjection {
    /// Wraps an initial state.
    pub fn new(state: UiState) -> Self {
        Self {
            state: Mutex::new(state),
            listener: None,
        }
    }

    /// Calls `listener` after every state change.
    pub fn with_listener(mut self, listener: impl Fn(&UiState) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> UiState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, apply: impl FnOnce(&mut UiState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
        if let Some(listener) = &self.listener {
            listener(&state);
        }
    }
}

impl fmt::Debug for UiProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiProjection")
            .field("state", &self.snapshot())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl UploadObserver for UiProjection {
    fn on_phase(&self, phase: UploadPhase) {
        self.update(|state| state.apply_phase(phase));
    }

    fn on_progress(&self, percent: u8) {
        self.update(|state| state.apply_progress(percent));
    }

    fn on_complete(&self, notice: &CompletionNotice) {
        self.update(|state| state.apply_upload_complete(notice.media_id));
    }
}

impl PollObserver for UiProjection {
    fn on_status(&self, result: &AnalysisResult) {
        self.update(|state| state.apply_analysis_status(result));
    }
}

impl AnalysisStepObserver for UiProjection {
    fn on_analysis_step(&self, progress: &AnalysisStepProgress) {
        self.update(|state| {
            state.apply_analysis_step(
                progress.label,
                progress.step_percent,
                progress.overall_percent,
            );
        });
    }
}
