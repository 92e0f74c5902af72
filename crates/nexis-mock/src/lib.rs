#![warn(missing_docs)]
//! # nexis-mock
//!
//! ## Purpose
//! Synthesizes upload progress and analysis results when the backend cannot
//! be used, so every submitted file still reaches a terminal state.
//!
//! ## Responsibilities
//! - Walk the fixed progress checkpoints (25/50/75/100) with short delays.
//! - Play the four named analysis steps with per-step and overall progress.
//! - Produce randomized results with the same shape as backend results.
//!
//! ## Data flow
//! Upload orchestrator failure path -> [`MockEngine::simulate_upload`] ->
//! [`MockEngine::play_analysis_steps`] -> [`MockEngine::simulate_analysis`]
//! -> [`AnalysisResult`] for the results view.
//!
//! ## Ownership and lifetimes
//! The engine owns its RNG behind a mutex that is never held across an
//! `await`.
//!
//! ## Error model
//! Simulation cannot fail.
//!
//! ## Security and privacy notes
//! Only the file size and media kind are read; file contents are ignored.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use nexis_analysis_contract::{
    AnalysisResult, AnalysisStatus, DetectionReport, HeatmapPoint, ReportMetadata,
};
use nexis_core::{MediaFile, MediaKind, PROGRESS_CHECKPOINTS, PROGRESS_COMPLETE, PROGRESS_SLOT_ACQUIRED};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Model version reported by simulated results.
pub const MOCK_MODEL_VERSION: &str = "v3.2.1";
/// Analysis time label reported by simulated results.
pub const MOCK_ANALYSIS_TIME: &str = "2.3s";
/// Analysis time in seconds reported by simulated results.
pub const MOCK_PROCESSING_SECONDS: f64 = 2.3;
/// Placeholder tool names attached to every simulated report.
pub const MOCK_DETECTED_TOOLS: [&str; 2] = ["FaceSwap", "DeepFaceLab"];
/// Synthetic resolution reported for images.
pub const MOCK_IMAGE_RESOLUTION: &str = "1920x1080";
/// Synthetic duration reported for video and audio.
pub const MOCK_CLIP_DURATION: &str = "00:00:45";
/// Number of heatmap samples per report.
pub const MOCK_HEATMAP_POINTS: usize = 20;
/// Probability of a simulated deepfake verdict.
pub const MOCK_DEEPFAKE_PROBABILITY: f64 = 0.3;
/// Default pause between simulated checkpoints.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_secs(1);
/// Progress updates emitted per analysis step.
pub const ANALYSIS_STEP_TICKS: u32 = 10;

/// One named stage of the simulated analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisStep {
    /// Stable identifier.
    pub id: &'static str,
    /// Display label.
    pub label: &'static str,
    /// What the stage stands for.
    pub description: &'static str,
    /// Run time at 100% pace.
    pub duration: Duration,
}

/// Simulated analysis stages, in order.
pub const MOCK_ANALYSIS_STEPS: [AnalysisStep; 4] = [
    AnalysisStep {
        id: "preprocessing",
        label: "Preprocessing",
        description: "Extracting and normalizing media data",
        duration: Duration::from_secs(2),
    },
    AnalysisStep {
        id: "feature-extraction",
        label: "Feature Extraction",
        description: "Analyzing visual/audio patterns and artifacts",
        duration: Duration::from_secs(3),
    },
    AnalysisStep {
        id: "ai-analysis",
        label: "AI Analysis",
        description: "Running deepfake detection algorithms",
        duration: Duration::from_secs(4),
    },
    AnalysisStep {
        id: "verification",
        label: "Verification",
        description: "Cross-referencing with known patterns",
        duration: Duration::from_secs(2),
    },
];

/// Delay policy for simulated progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockTiming {
    /// Pause before each checkpoint after the slot checkpoint.
    pub step_delay: Duration,
    /// Analysis step duration scale in percent; 0 plays the steps instantly.
    pub analysis_pace_percent: u32,
}

impl MockTiming {
    /// No delays; used by tests and non-interactive runs.
    pub fn instant() -> Self {
        Self {
            step_delay: Duration::ZERO,
            analysis_pace_percent: 0,
        }
    }

    /// Run time of `step` under this pace.
    pub fn analysis_step_duration(&self, step: &AnalysisStep) -> Duration {
        step.duration * self.analysis_pace_percent / 100
    }
}

impl Default for MockTiming {
    fn default() -> Self {
        Self {
            step_delay: DEFAULT_STEP_DELAY,
            analysis_pace_percent: 100,
        }
    }
}

/// Progress of the simulated analysis at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisStepProgress {
    /// Position in [`MOCK_ANALYSIS_STEPS`].
    pub index: usize,
    /// Label of the running step.
    pub label: &'static str,
    /// Progress within the step, 0..=100.
    pub step_percent: u8,
    /// Progress across all steps, 0..=100.
    pub overall_percent: u8,
}

/// Receives simulated analysis progress.
pub trait AnalysisStepObserver: Send + Sync {
    /// Called once per tick, in order.
    fn on_analysis_step(&self, progress: &AnalysisStepProgress);
}

impl<F> AnalysisStepObserver for F
where
    F: Fn(&AnalysisStepProgress) + Send + Sync,
{
    fn on_analysis_step(&self, progress: &AnalysisStepProgress) {
        self(progress)
    }
}

/// Overall percent after `index` whole steps plus `step_percent` of the next.
pub fn overall_analysis_percent(index: usize, step_percent: u8) -> u8 {
    let steps = MOCK_ANALYSIS_STEPS.len() as u32;
    let done = (index as u32).min(steps) * 100 + u32::from(step_percent.min(100));
    (done / steps).min(100) as u8
}

/// Checkpoints strictly above `current`, in ascending order.
pub fn checkpoints_after(current: u8) -> impl Iterator<Item = u8> {
    PROGRESS_CHECKPOINTS
        .into_iter()
        .filter(move |checkpoint| *checkpoint > current)
}

/// Local stand-in for the upload and analysis backend.
#[derive(Debug)]
pub struct MockEngine {
    timing: MockTiming,
    rng: Mutex<StdRng>,
}

impl MockEngine {
    /// Creates an engine seeded from the operating system.
    pub fn new(timing: MockTiming) -> Self {
        Self {
            timing,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Creates a deterministic engine.
    pub fn with_seed(timing: MockTiming, seed: u64) -> Self {
        Self {
            timing,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Delay policy in use.
    pub fn timing(&self) -> MockTiming {
        self.timing
    }

    /// Emits every remaining checkpoint through `report` and returns 100.
    ///
    /// The slot checkpoint is emitted immediately; later checkpoints each
    /// wait one step delay first. No network I/O happens here.
    pub async fn simulate_upload<F>(&self, current: u8, mut report: F) -> u8
    where
        F: FnMut(u8) + Send,
    {
        info!(from = current, "using mock upload process");
        for checkpoint in checkpoints_after(current) {
            if checkpoint > PROGRESS_SLOT_ACQUIRED && !self.timing.step_delay.is_zero() {
                tokio::time::sleep(self.timing.step_delay).await;
            }
            debug!(checkpoint, "mock progress");
            report(checkpoint);
        }
        PROGRESS_COMPLETE
    }

    /// Plays [`MOCK_ANALYSIS_STEPS`] in order, reporting every tick.
    ///
    /// Each step advances in [`ANALYSIS_STEP_TICKS`] equal increments spread
    /// over its paced duration. Returns `false` when `cancel` fires first;
    /// no tick is reported after that.
    pub async fn play_analysis_steps(
        &self,
        observer: &dyn AnalysisStepObserver,
        cancel: &CancellationToken,
    ) -> bool {
        info!(steps = MOCK_ANALYSIS_STEPS.len(), "using mock analysis steps");
        for (index, step) in MOCK_ANALYSIS_STEPS.iter().enumerate() {
            let tick = self.timing.analysis_step_duration(step) / ANALYSIS_STEP_TICKS;
            for count in 1..=ANALYSIS_STEP_TICKS {
                if tick.is_zero() {
                    if cancel.is_cancelled() {
                        return false;
                    }
                } else {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(tick) => {}
                    }
                }

                let step_percent = (count * 100 / ANALYSIS_STEP_TICKS) as u8;
                observer.on_analysis_step(&AnalysisStepProgress {
                    index,
                    label: step.label,
                    step_percent,
                    overall_percent: overall_analysis_percent(index, step_percent),
                });
            }
            debug!(step = step.id, "mock analysis step finished");
        }
        true
    }

    /// Plays the analysis steps, then produces a completed result.
    ///
    /// Returns `None` when `cancel` fires before the last step finishes.
    pub async fn simulate_analysis_steps(
        &self,
        file: &MediaFile,
        observer: &dyn AnalysisStepObserver,
        cancel: &CancellationToken,
    ) -> Option<AnalysisResult> {
        if !self.play_analysis_steps(observer, cancel).await {
            info!("mock analysis cancelled");
            return None;
        }
        Some(self.simulate_analysis(file))
    }

    /// Random media id in `[0, 1000)` for simulated slots.
    pub fn mock_media_id(&self) -> i64 {
        self.rng().random_range(0..1000)
    }

    /// Produces a completed result for `file`.
    pub fn simulate_analysis(&self, file: &MediaFile) -> AnalysisResult {
        let mut rng = self.rng();
        let confidence_percent: f64 = rng.random_range(70.0..100.0);
        let is_deepfake = rng.random_bool(MOCK_DEEPFAKE_PROBABILITY);
        let heatmap = (0..MOCK_HEATMAP_POINTS)
            .map(|_| HeatmapPoint {
                x: rng.random_range(0.0..100.0),
                y: rng.random_range(0.0..100.0),
                intensity: rng.random::<f64>(),
            })
            .collect();
        let media_id = rng.random_range(0..1000);
        drop(rng);

        let (resolution, duration) = match file.kind() {
            MediaKind::Image => (Some(MOCK_IMAGE_RESOLUTION.to_string()), None),
            MediaKind::Video | MediaKind::Audio => (None, Some(MOCK_CLIP_DURATION.to_string())),
        };

        let confidence = confidence_percent / 100.0;
        let deepfake_score = if is_deepfake { confidence } else { 1.0 - confidence };
        info!(is_deepfake, "using mock analysis process");

        AnalysisResult {
            analysis_id: None,
            media_id: Some(media_id),
            status: AnalysisStatus::Completed,
            deepfake_score: Some(deepfake_score),
            confidence: Some(confidence),
            model_version: MOCK_MODEL_VERSION.to_string(),
            processing_time_seconds: MOCK_PROCESSING_SECONDS,
            message: None,
            error_message: None,
            report: Some(DetectionReport {
                is_deepfake,
                confidence_percent,
                detected_tools: MOCK_DETECTED_TOOLS.iter().map(ToString::to_string).collect(),
                metadata: ReportMetadata {
                    file_size: file.size(),
                    resolution,
                    duration,
                    analysis_time: MOCK_ANALYSIS_TIME.to_string(),
                    model_version: MOCK_MODEL_VERSION.to_string(),
                },
                heatmap,
            }),
        }
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new(MockTiming::default())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for checkpoint selection.

    use super::*;

    #[test]
    fn overall_percent_spans_all_steps() {
        assert_eq!(overall_analysis_percent(0, 0), 0);
        assert_eq!(overall_analysis_percent(0, 100), 25);
        assert_eq!(overall_analysis_percent(1, 60), 40);
        assert_eq!(overall_analysis_percent(3, 100), 100);
        assert_eq!(overall_analysis_percent(9, 100), 100);
    }

    #[test]
    fn pace_scales_step_durations() {
        let half = MockTiming {
            analysis_pace_percent: 50,
            ..MockTiming::default()
        };
        assert_eq!(
            half.analysis_step_duration(&MOCK_ANALYSIS_STEPS[2]),
            Duration::from_secs(2)
        );
        assert_eq!(
            MockTiming::instant().analysis_step_duration(&MOCK_ANALYSIS_STEPS[2]),
            Duration::ZERO
        );
    }

    #[test]
    fn skips_checkpoints_already_reached() {
        assert_eq!(checkpoints_after(0).collect::<Vec<_>>(), vec![25, 50, 75, 100]);
        assert_eq!(checkpoints_after(60).collect::<Vec<_>>(), vec![75, 100]);
        assert_eq!(checkpoints_after(75).collect::<Vec<_>>(), vec![100]);
        assert_eq!(checkpoints_after(100).count(), 0);
    }
}
