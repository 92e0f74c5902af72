//! Integration tests for analysis payload parsing.

use nexis_analysis_contract::{
    AnalysisContractError, AnalysisStatus, parse_analysis_result, parse_upload_slot,
};

#[test]
fn analysis_result_parsing_tests_accept_completed_payload() {
    let raw = r#"{
        "analysis_id": 11,
        "file_id": 4,
        "status": "completed",
        "deepfake_score": 0.82,
        "confidence": 0.93,
        "model_version": "v3.2.1",
        "processing_time": 2.3,
        "error_message": null
    }"#;

    let result = parse_analysis_result(raw).expect("completed payload should parse");
    assert_eq!(result.media_id, Some(4));
    assert_eq!(result.status, AnalysisStatus::Completed);
    assert!(result.is_terminal());
    assert_eq!(result.processing_time_seconds, 2.3);
}

#[test]
fn analysis_result_parsing_tests_reject_out_of_range_scores() {
    let raw = r#"{"status":"completed","deepfake_score":1.5}"#;
    let error = parse_analysis_result(raw).expect_err("score above 1 should be rejected");
    assert!(matches!(error, AnalysisContractError::InvalidContract(_)));
}

#[test]
fn analysis_result_parsing_tests_reject_unknown_status() {
    let error = parse_analysis_result(r#"{"status":"exploded"}"#)
        .expect_err("unknown status should be rejected");
    assert!(matches!(error, AnalysisContractError::Decode(_)));
}

#[test]
fn analysis_result_parsing_tests_surface_failure_message() {
    let result = parse_analysis_result(
        r#"{"analysis_id":3,"status":"failed","error_message":"model crashed"}"#,
    )
    .expect("failed payload should parse");
    assert_eq!(result.status, AnalysisStatus::Failed);
    assert_eq!(result.error_message.as_deref(), Some("model crashed"));
}

#[test]
fn analysis_result_parsing_tests_decode_upload_slot() {
    let slot = parse_upload_slot(
        r#"{"media_id":9,"upload_url":"https://storage.test/put/9","expires_in":3600}"#,
    )
    .expect("slot should parse");
    assert_eq!(slot.media_id, 9);
    assert_eq!(slot.expires_in, 3600);

    assert!(parse_upload_slot(r#"{"media_id":9,"upload_url":" "}"#).is_err());
}
