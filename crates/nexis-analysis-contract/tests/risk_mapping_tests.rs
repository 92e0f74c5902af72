//! Integration tests for score-to-risk projection.

use nexis_analysis_contract::{AnalysisResult, AnalysisStatus, RiskLevel};

#[test]
fn risk_mapping_tests_follow_score_thresholds() {
    let mut result = AnalysisResult {
        status: AnalysisStatus::Completed,
        deepfake_score: Some(0.55),
        ..AnalysisResult::default()
    };
    assert_eq!(result.risk_level(), Some(RiskLevel::Medium));

    result.deepfake_score = Some(0.71);
    assert_eq!(result.risk_level(), Some(RiskLevel::High));

    result.deepfake_score = None;
    assert_eq!(result.risk_level(), None);
}

#[test]
fn risk_mapping_tests_failed_helper_is_terminal() {
    let failed = AnalysisResult::failed("Failed to get analysis status");
    assert!(failed.is_terminal());
    assert_eq!(failed.risk_level(), None);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("Failed to get analysis status")
    );
}
