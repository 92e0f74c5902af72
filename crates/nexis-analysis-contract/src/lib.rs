#![warn(missing_docs)]
//! # nexis-analysis-contract
//!
//! ## Purpose
//! Defines the backend wire payloads for upload slots and analysis results,
//! plus client-side mapping helpers.
//!
//! ## Responsibilities
//! - Parse analysis status payloads, tolerating absent or `null` fields.
//! - Validate score ranges before results reach the UI.
//! - Map deepfake scores to UI-safe risk levels.
//!
//! ## Data flow
//! Raw JSON response -> [`parse_analysis_result`] -> [`AnalysisResult`] ->
//! [`AnalysisResult::risk_level`] -> results view.
//!
//! ## Ownership and lifetimes
//! Parsed values are owned structs so they outlive transient network buffers.
//!
//! ## Error model
//! Invalid JSON or out-of-range scores return [`AnalysisContractError`].
//!
//! ## Security and privacy notes
//! This crate only handles model outputs and media identifiers; it never
//! touches credentials.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Backend analysis lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Queued, not yet started.
    #[default]
    Pending,
    /// Model is running.
    Processing,
    /// Finished with a verdict.
    Completed,
    /// Finished without a verdict.
    Failed,
}

impl AnalysisStatus {
    /// Returns `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Analysis state as reported by the backend or synthesized by the mock
/// engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Backend analysis id; absent until the backend assigns one.
    #[serde(default)]
    pub analysis_id: Option<i64>,
    /// Media/file the analysis refers to.
    #[serde(default, alias = "file_id")]
    pub media_id: Option<i64>,
    /// Lifecycle status.
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: AnalysisStatus,
    /// Probability in `[0, 1]` that the media is manipulated.
    #[serde(default)]
    pub deepfake_score: Option<f64>,
    /// Model confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Model version that produced the verdict.
    #[serde(default, deserialize_with = "null_as_default")]
    pub model_version: String,
    /// Wall-clock analysis time in seconds.
    #[serde(
        default,
        rename = "processing_time",
        deserialize_with = "null_as_default"
    )]
    pub processing_time_seconds: f64,
    /// Informational message from the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure reason when `status == failed`.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Extended detection report for the results view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<DetectionReport>,
}

impl AnalysisResult {
    /// A freshly triggered analysis for `media_id`.
    pub fn pending(media_id: i64) -> Self {
        Self {
            media_id: Some(media_id),
            ..Self::default()
        }
    }

    /// Terminal failed state carrying `message`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Failed,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Returns `true` once no further transitions will occur.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Risk level for the deepfake score, when one is present.
    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.deepfake_score.map(risk_level)
    }
}

/// Extended verdict detail shown by the results view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Binary verdict.
    pub is_deepfake: bool,
    /// Confidence in percent, `[0, 100]`.
    pub confidence_percent: f64,
    /// Manipulation tools the model associates with the media.
    #[serde(default)]
    pub detected_tools: Vec<String>,
    /// Media and model metadata.
    pub metadata: ReportMetadata,
    /// Localized manipulation intensity samples.
    #[serde(default)]
    pub heatmap: Vec<HeatmapPoint>,
}

/// Media and model metadata attached to a [`DetectionReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Size of the analyzed file in bytes.
    pub file_size: u64,
    /// Pixel resolution, for images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Clip duration (`HH:MM:SS`), for video and audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Human-readable analysis time.
    pub analysis_time: String,
    /// Model version string.
    pub model_version: String,
}

/// One heatmap sample in percent coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    /// Horizontal position in `[0, 100)`.
    pub x: f64,
    /// Vertical position in `[0, 100)`.
    pub y: f64,
    /// Intensity in `[0, 1)`.
    pub intensity: f64,
}

/// Backend-issued upload destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSlot {
    /// Media id that keys the later analysis.
    pub media_id: i64,
    /// Pre-signed URL accepting a `PUT` of the file bytes.
    pub upload_url: String,
    /// Slot lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
}

/// Body of the analysis trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTrigger {
    /// Uploaded media id.
    pub media_id: i64,
}

/// Response of the report download route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedDownload {
    /// Time-limited download URL.
    pub presigned_url: String,
}

/// UI-safe risk level derived from the deepfake score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score below 0.4.
    Low,
    /// Score in `[0.4, 0.7)`.
    Medium,
    /// Score of 0.7 or more.
    High,
}

impl RiskLevel {
    /// Display label used by the results view.
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High => "High Risk",
        }
    }
}

/// Maps a deepfake score to a risk level.
pub fn risk_level(score: f64) -> RiskLevel {
    if score >= 0.7 {
        RiskLevel::High
    } else if score >= 0.4 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Parses and validates an analysis status payload.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON and
/// [`AnalysisContractError::InvalidContract`] for out-of-range scores.
pub fn parse_analysis_result(raw: &str) -> Result<AnalysisResult, AnalysisContractError> {
    let parsed: AnalysisResult = serde_json::from_str(raw)?;
    validate_analysis_result(&parsed)?;
    Ok(parsed)
}

/// Checks score ranges on an already decoded result.
///
/// # Errors
/// Returns [`AnalysisContractError::InvalidContract`] when `deepfake_score`,
/// `confidence` or the report confidence fall outside their ranges.
pub fn validate_analysis_result(result: &AnalysisResult) -> Result<(), AnalysisContractError> {
    check_unit_range("deepfake_score", result.deepfake_score)?;
    check_unit_range("confidence", result.confidence)?;

    if let Some(report) = &result.report
        && !(0.0..=100.0).contains(&report.confidence_percent)
    {
        return Err(AnalysisContractError::InvalidContract(format!(
            "report confidence {} outside [0, 100]",
            report.confidence_percent
        )));
    }

    if result.processing_time_seconds.is_sign_negative() {
        return Err(AnalysisContractError::InvalidContract(
            "processing_time is negative".to_string(),
        ));
    }

    Ok(())
}

/// Parses an upload slot response.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON and
/// [`AnalysisContractError::InvalidContract`] for a blank upload URL.
pub fn parse_upload_slot(raw: &str) -> Result<UploadSlot, AnalysisContractError> {
    let slot: UploadSlot = serde_json::from_str(raw)?;
    if slot.upload_url.trim().is_empty() {
        return Err(AnalysisContractError::InvalidContract(
            "upload_url is empty".to_string(),
        ));
    }
    Ok(slot)
}

fn check_unit_range(field: &str, value: Option<f64>) -> Result<(), AnalysisContractError> {
    match value {
        Some(value) if !(0.0..=1.0).contains(&value) => Err(
            AnalysisContractError::InvalidContract(format!("{field} {value} outside [0, 1]")),
        ),
        _ => Ok(()),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Analysis contract errors.
#[derive(Debug, Error)]
pub enum AnalysisContractError {
    /// JSON decode failure.
    #[error("analysis decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Decoded payload violates contract invariants.
    #[error("analysis contract violation: {0}")]
    InvalidContract(String),
}
