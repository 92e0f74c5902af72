#![warn(missing_docs)]
//! # nexis-ui
//!
//! ## Purpose
//! Defines the presentation state for the three-step analysis flow:
//! upload, analysis, results.
//!
//! ## Responsibilities
//! - Project auth, upload phase and progress into display-safe state.
//! - Track the simulated analysis step and its overall progress.
//! - Map terminal analysis results to status text and a risk level.
//! - Gate new submissions while a task is active.
//!
//! ## Data flow
//! Upload observer and poll observer events mutate [`UiState`], which the
//! CLI renders as status lines.
//!
//! ## Ownership and lifetimes
//! `UiState` owns every string it shows so reducers never borrow from
//! transient task or response values.
//!
//! ## Error model
//! No errors; out-of-order events are ignored by the reducers.
//!
//! ## Security and privacy notes
//! UI state never holds credentials, tokens, or file contents.

use nexis_analysis_contract::{AnalysisResult, AnalysisStatus, RiskLevel};
use nexis_core::{UploadPhase, format_file_size};

/// UI-auth state projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAuthState {
    /// No session held.
    Unauthenticated,
    /// A bearer token is held.
    Authenticated,
}

/// Step of the analysis flow currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    /// File selection and upload.
    Upload,
    /// Waiting for the analysis verdict.
    Analysis,
    /// Verdict display.
    Results,
}

/// Aggregate UI runtime state.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// Current auth status.
    pub auth: UiAuthState,
    /// Current flow step.
    pub stage: FlowStage,
    /// Selected file as `name (size)`.
    pub selected_file: Option<String>,
    /// Phase of the active upload task.
    pub upload_phase: UploadPhase,
    /// Overall upload progress in percent.
    pub upload_progress: u8,
    /// `true` once the simulated path took over.
    pub simulated: bool,
    /// Human-readable analysis status.
    pub analysis_status: String,
    /// Label of the running simulated analysis step.
    pub analysis_step: Option<String>,
    /// Overall simulated analysis progress in percent.
    pub analysis_progress: u8,
    /// Risk level of the verdict, when one exists.
    pub risk: Option<RiskLevel>,
    /// Verdict confidence as a display string.
    pub confidence: Option<String>,
    /// Media id usable for report download.
    pub media_id: Option<i64>,
}

impl UiState {
    /// Creates default UI state.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            auth: UiAuthState::Unauthenticated,
            stage: FlowStage::Upload,
            selected_file: None,
            upload_phase: UploadPhase::Idle,
            upload_progress: 0,
            simulated: false,
            analysis_status: "No analysis yet".to_string(),
            analysis_step: None,
            analysis_progress: 0,
            risk: None,
            confidence: None,
            media_id: None,
        }
    }

    /// Sets auth state from the session.
    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.auth = if authenticated {
            UiAuthState::Authenticated
        } else {
            UiAuthState::Unauthenticated
        };
    }

    /// Records the file picked for upload.
    pub fn select_file(&mut self, name: &str, size: u64) {
        self.selected_file = Some(format!("{name} ({})", format_file_size(size)));
    }

    /// Returns `true` when a new file may be submitted.
    pub fn can_submit(&self) -> bool {
        self.stage == FlowStage::Upload && self.upload_phase == UploadPhase::Idle
    }

    /// Applies an upload phase change.
    pub fn apply_phase(&mut self, phase: UploadPhase) {
        self.upload_phase = phase;
        match phase {
            UploadPhase::Idle => self.upload_progress = 0,
            UploadPhase::Mocked => self.simulated = true,
            UploadPhase::Polling => {
                self.stage = FlowStage::Analysis;
                self.analysis_status = "Analysis in progress".to_string();
            }
            _ => {}
        }
    }

    /// Applies an upload progress value; lower values are ignored.
    pub fn apply_progress(&mut self, percent: u8) {
        self.upload_progress = self.upload_progress.max(percent.min(100));
    }

    /// Moves to the analysis step once the upload pipeline reports 100%.
    pub fn apply_upload_complete(&mut self, media_id: i64) {
        self.upload_progress = 100;
        self.media_id = Some(media_id);
        if self.stage == FlowStage::Upload {
            self.stage = FlowStage::Analysis;
            self.analysis_status = "Analyzing media".to_string();
        }
    }

    /// Applies one simulated analysis tick; ignored once results are shown.
    pub fn apply_analysis_step(&mut self, label: &str, step_percent: u8, overall_percent: u8) {
        if self.stage == FlowStage::Results {
            return;
        }
        self.stage = FlowStage::Analysis;
        self.simulated = true;
        self.analysis_progress = self.analysis_progress.max(overall_percent.min(100));
        self.analysis_step = Some(label.to_string());
        self.analysis_status = format!(
            "{label} {}% ({}% overall)",
            step_percent.min(100),
            self.analysis_progress
        );
    }

    /// Applies a polled status; terminal statuses move to the results step.
    pub fn apply_analysis_status(&mut self, result: &AnalysisResult) {
        match result.status {
            AnalysisStatus::Pending => self.analysis_status = "Analysis queued".to_string(),
            AnalysisStatus::Processing => {
                self.analysis_status = "Analysis in progress".to_string();
            }
            AnalysisStatus::Completed | AnalysisStatus::Failed => self.apply_result(result),
        }
    }

    /// Maps a terminal result to status text and risk level.
    pub fn apply_result(&mut self, result: &AnalysisResult) {
        if result.media_id.is_some() {
            self.media_id = result.media_id;
        }

        match result.status {
            AnalysisStatus::Failed => {
                let reason = result.error_message.as_deref().unwrap_or("unknown error");
                self.analysis_status = format!("Analysis failed: {reason}");
                self.risk = None;
                self.confidence = None;
            }
            _ => {
                self.analysis_status = "Analysis completed".to_string();
                self.risk = result.risk_level();
                self.confidence = result
                    .confidence
                    .map(|confidence| format!("{:.1}%", confidence * 100.0));
            }
        }
        self.stage = FlowStage::Results;
    }

    /// Returns `true` when a report link can be requested.
    pub fn can_download(&self) -> bool {
        self.stage == FlowStage::Results && self.risk.is_some() && self.media_id.is_some()
    }

    /// One-line summary for terminal rendering.
    pub fn status_line(&self) -> String {
        match self.stage {
            FlowStage::Upload if self.upload_phase == UploadPhase::Idle => {
                "Ready for upload".to_string()
            }
            FlowStage::Upload => format!("Uploading {}%", self.upload_progress),
            FlowStage::Analysis => self.analysis_status.clone(),
            FlowStage::Results => match self.risk {
                Some(risk) => format!("{} - {}", self.analysis_status, risk.label()),
                None => self.analysis_status.clone(),
            },
        }
    }

    /// Starts over at the upload step, keeping version and auth.
    pub fn reset(&mut self) {
        *self = Self {
            auth: self.auth,
            ..Self::new(std::mem::take(&mut self.version))
        };
    }
}
