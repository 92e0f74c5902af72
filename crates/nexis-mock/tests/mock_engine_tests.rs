//! Integration tests for simulated progress and results.

use std::sync::Mutex;
use std::time::Duration;

use nexis_analysis_contract::{AnalysisStatus, validate_analysis_result};
use nexis_core::MediaFile;
use nexis_mock::{
    ANALYSIS_STEP_TICKS, AnalysisStepProgress, MOCK_ANALYSIS_STEPS, MOCK_CLIP_DURATION,
    MOCK_HEATMAP_POINTS, MOCK_IMAGE_RESOLUTION, MockEngine, MockTiming,
};
use tokio_util::sync::CancellationToken;

fn video_fixture() -> MediaFile {
    MediaFile::new("clip.mp4", "video/mp4", vec![0_u8; 2048]).expect("fixture video")
}

#[tokio::test(start_paused = true)]
async fn mock_engine_tests_walk_all_checkpoints_within_budget() {
    let engine = MockEngine::with_seed(MockTiming::default(), 7);
    let started = tokio::time::Instant::now();
    let mut seen = Vec::new();

    let reached = engine.simulate_upload(0, |value| seen.push(value)).await;

    assert_eq!(reached, 100);
    assert_eq!(seen, vec![25, 50, 75, 100]);
    assert!(started.elapsed() <= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn mock_engine_tests_resume_from_trigger_failure() {
    let engine = MockEngine::with_seed(MockTiming::default(), 7);
    let mut seen = Vec::new();
    engine.simulate_upload(75, |value| seen.push(value)).await;
    assert_eq!(seen, vec![100]);
}

#[test]
fn mock_engine_tests_results_stay_in_range() {
    let engine = MockEngine::with_seed(MockTiming::instant(), 42);
    let file = video_fixture();
    let mut deepfakes = 0;

    for _ in 0..500 {
        let result = engine.simulate_analysis(&file);
        validate_analysis_result(&result).expect("mock result should satisfy the contract");
        assert_eq!(result.status, AnalysisStatus::Completed);

        let report = result.report.as_ref().expect("mock result carries a report");
        assert!((70.0..100.0).contains(&report.confidence_percent));
        assert_eq!(report.heatmap.len(), MOCK_HEATMAP_POINTS);
        assert_eq!(report.metadata.file_size, 2048);
        assert!(
            report
                .heatmap
                .iter()
                .all(|point| (0.0..1.0).contains(&point.intensity))
        );

        let score = result.deepfake_score.expect("mock result carries a score");
        assert!((0.0..=1.0).contains(&score));
        if report.is_deepfake {
            deepfakes += 1;
            assert!(score >= 0.7);
        } else {
            assert!(score <= 0.3);
        }
    }

    assert!((100..=200).contains(&deepfakes), "deepfakes={deepfakes}");
}

#[test]
fn mock_engine_tests_metadata_depends_on_media_kind() {
    let engine = MockEngine::with_seed(MockTiming::instant(), 1);

    let image = MediaFile::new("a.png", "image/png", vec![1_u8; 4]).expect("fixture image");
    let report = engine.simulate_analysis(&image).report.expect("report");
    assert_eq!(report.metadata.resolution.as_deref(), Some(MOCK_IMAGE_RESOLUTION));
    assert_eq!(report.metadata.duration, None);

    let report = engine.simulate_analysis(&video_fixture()).report.expect("report");
    assert_eq!(report.metadata.resolution, None);
    assert_eq!(report.metadata.duration.as_deref(), Some(MOCK_CLIP_DURATION));
}

#[test]
fn mock_engine_tests_same_seed_same_verdicts() {
    let file = video_fixture();
    let first = MockEngine::with_seed(MockTiming::instant(), 99).simulate_analysis(&file);
    let second = MockEngine::with_seed(MockTiming::instant(), 99).simulate_analysis(&file);
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn mock_engine_tests_analysis_steps_follow_fixed_durations() {
    let engine = MockEngine::with_seed(MockTiming::default(), 11);
    let seen = Mutex::new(Vec::new());
    let observer = |progress: &AnalysisStepProgress| {
        seen.lock().expect("seen lock").push(*progress);
    };
    let started = tokio::time::Instant::now();

    let result = engine
        .simulate_analysis_steps(&video_fixture(), &observer, &CancellationToken::new())
        .await
        .expect("uncancelled steps should produce a result");

    assert_eq!(started.elapsed(), Duration::from_secs(11));
    assert_eq!(result.status, AnalysisStatus::Completed);

    let seen = seen.into_inner().expect("seen lock");
    assert_eq!(seen.len(), MOCK_ANALYSIS_STEPS.len() * ANALYSIS_STEP_TICKS as usize);
    assert!(
        seen.windows(2)
            .all(|pair| pair[0].overall_percent <= pair[1].overall_percent)
    );
    let labels: Vec<&str> = seen
        .iter()
        .filter(|progress| progress.step_percent == 100)
        .map(|progress| progress.label)
        .collect();
    assert_eq!(
        labels,
        vec!["Preprocessing", "Feature Extraction", "AI Analysis", "Verification"]
    );
    let last = seen.last().expect("at least one tick");
    assert_eq!(last.overall_percent, 100);
}

#[tokio::test(start_paused = true)]
async fn mock_engine_tests_cancel_stops_analysis_steps() {
    let engine = MockEngine::with_seed(MockTiming::default(), 11);
    let cancel = CancellationToken::new();
    let seen = Mutex::new(Vec::new());
    let observer = |progress: &AnalysisStepProgress| {
        seen.lock().expect("seen lock").push(*progress);
    };
    let canceller = async {
        tokio::time::sleep(Duration::from_secs(4)).await;
        cancel.cancel();
    };

    let video = video_fixture();
    let (result, ()) = tokio::join!(
        engine.simulate_analysis_steps(&video, &observer, &cancel),
        canceller
    );

    assert!(result.is_none());
    let seen = seen.into_inner().expect("seen lock");
    let last = seen.last().expect("ticks before cancellation");
    assert_eq!(last.label, "Feature Extraction");
    assert_eq!(last.step_percent, 60);
    assert_eq!(last.overall_percent, 40);
}

#[tokio::test]
async fn mock_engine_tests_instant_pace_plays_every_tick() {
    let engine = MockEngine::with_seed(MockTiming::instant(), 2);
    let seen = Mutex::new(0_usize);
    let observer = |_: &AnalysisStepProgress| {
        *seen.lock().expect("seen lock") += 1;
    };

    assert!(engine.play_analysis_steps(&observer, &CancellationToken::new()).await);
    assert_eq!(*seen.lock().expect("seen lock"), 40);

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(!engine.play_analysis_steps(&observer, &cancelled).await);
    assert_eq!(*seen.lock().expect("seen lock"), 40);
}
