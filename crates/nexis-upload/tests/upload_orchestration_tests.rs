//! Integration tests for the upload state machine with scripted transports.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    RecordingObserver, RefusingAuth, ScriptedTransport, Step, assert_monotonic,
    authenticator_with, orchestrator, sample_image,
};
use nexis_analysis_contract::AnalysisStatus;
use nexis_auth::SessionStore;
use nexis_core::{UploadPhase, UploadTask};
use nexis_mock::{MockEngine, MockTiming};
use nexis_upload::{OrchestratorError, UploadError, UploadOrchestrator, UploadOutcome};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn upload_orchestration_tests_healthy_backend_completes_once() {
    let transport = Arc::new(ScriptedTransport::healthy());
    let orchestrator = orchestrator(transport.clone());
    let observer = RecordingObserver::default();
    let mut task = UploadTask::new(sample_image());

    let outcome = orchestrator
        .run(&mut task, &observer, &CancellationToken::new())
        .await
        .expect("healthy run should finish");

    match outcome {
        UploadOutcome::Uploaded { media_id, analysis } => {
            assert_eq!(media_id, 42);
            assert_eq!(analysis.analysis_id, Some(7));
            assert_eq!(analysis.status, AnalysisStatus::Processing);
        }
        other => panic!("expected backend upload, got {other:?}"),
    }

    assert_eq!(observer.progress(), vec![25, 50, 75, 100]);
    assert_eq!(
        observer.phases(),
        vec![
            UploadPhase::RequestingSlot,
            UploadPhase::Transferring,
            UploadPhase::TriggeringAnalysis,
            UploadPhase::Completed,
        ]
    );
    let completions = observer.completions();
    assert_eq!(completions.len(), 1);
    assert!(!completions[0].mocked);
    assert_eq!(completions[0].media_id, 42);
    assert_eq!(completions[0].file.name(), "portrait.png");
    assert_eq!(task.phase(), UploadPhase::Completed);
    assert_eq!(task.remote_media_id(), Some(42));
}

#[tokio::test(start_paused = true)]
async fn upload_orchestration_tests_missing_service_falls_back_to_mock() {
    let transport = Arc::new(ScriptedTransport::new(
        Step::Fail(UploadError::ServiceAbsent),
        Step::Succeed,
        Step::Succeed,
    ));
    let orchestrator = orchestrator(transport.clone());
    let observer = RecordingObserver::default();
    let mut task = UploadTask::new(sample_image());
    let started = tokio::time::Instant::now();

    let outcome = orchestrator
        .run(&mut task, &observer, &CancellationToken::new())
        .await
        .expect("fallback run should finish");

    let UploadOutcome::Mocked { reason, result } = outcome else {
        panic!("expected mocked outcome");
    };
    assert!(reason.contains("404"), "reason should name the status: {reason}");
    assert_eq!(result.status, AnalysisStatus::Completed);
    let score = result.deepfake_score.expect("mock result should carry a score");
    assert!((0.0..=1.0).contains(&score));

    assert_eq!(observer.progress(), vec![25, 50, 75, 100]);
    assert_eq!(observer.completions().len(), 1);
    assert!(observer.completions()[0].mocked);
    assert_eq!(task.phase(), UploadPhase::Mocked);
    assert_eq!(transport.transfer_calls.load(Ordering::SeqCst), 0);
    assert!(started.elapsed() <= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn upload_orchestration_tests_stalled_transfer_times_out_into_mock() {
    let transport = Arc::new(ScriptedTransport::new(Step::Succeed, Step::Hang, Step::Succeed));
    let orchestrator = orchestrator(transport.clone());
    let observer = RecordingObserver::default();
    let mut task = UploadTask::new(sample_image());
    let started = tokio::time::Instant::now();

    let outcome = orchestrator
        .run(&mut task, &observer, &CancellationToken::new())
        .await
        .expect("stalled run should still finish");

    assert!(outcome.is_mocked());
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(observer.progress(), vec![25, 50, 75, 100]);
    assert_eq!(transport.trigger_calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.media_id(), Some(42));
}

#[tokio::test(start_paused = true)]
async fn upload_orchestration_tests_trigger_failure_resumes_from_transferred() {
    let transport = Arc::new(ScriptedTransport::new(
        Step::Succeed,
        Step::Succeed,
        Step::Fail(UploadError::Client(422)),
    ));
    let orchestrator = orchestrator(transport);
    let observer = RecordingObserver::default();
    let mut task = UploadTask::new(sample_image());

    let outcome = orchestrator
        .run(&mut task, &observer, &CancellationToken::new())
        .await
        .expect("failed trigger should fall back");

    assert!(outcome.is_mocked());
    let progress = observer.progress();
    assert_monotonic(&progress);
    assert_eq!(progress, vec![25, 50, 75, 100]);
    assert_eq!(observer.completions().len(), 1);
    assert_eq!(observer.completions()[0].media_id, 42);
}

#[tokio::test(start_paused = true)]
async fn upload_orchestration_tests_cancel_during_transfer_resets_task() {
    let transport = Arc::new(ScriptedTransport::new(Step::Succeed, Step::Hang, Step::Succeed));
    let orchestrator = orchestrator(transport);
    let observer = RecordingObserver::default();
    let mut task = UploadTask::new(sample_image());
    let cancel = CancellationToken::new();

    let canceller = async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(orchestrator.run(&mut task, &observer, &cancel), canceller);

    assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    assert_eq!(task.phase(), UploadPhase::Idle);
    assert_eq!(task.progress(), 0);
    assert_eq!(task.remote_media_id(), None);
    assert!(observer.completions().is_empty());
    assert_eq!(observer.phases().last(), Some(&UploadPhase::Idle));
}

#[tokio::test(start_paused = true)]
async fn upload_orchestration_tests_cancel_during_mock_suppresses_notice() {
    let transport = Arc::new(ScriptedTransport::new(
        Step::Fail(UploadError::Network("connection refused".to_string())),
        Step::Succeed,
        Step::Succeed,
    ));
    let orchestrator = orchestrator(transport);
    let observer = RecordingObserver::default();
    let mut task = UploadTask::new(sample_image());
    let cancel = CancellationToken::new();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(orchestrator.run(&mut task, &observer, &cancel), canceller);

    assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    assert!(observer.completions().is_empty());
    assert_eq!(observer.progress(), vec![25, 50]);
    assert_eq!(task.phase(), UploadPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn upload_orchestration_tests_finished_task_rejects_second_run() {
    let orchestrator = orchestrator(Arc::new(ScriptedTransport::healthy()));
    let observer = RecordingObserver::default();
    let mut task = UploadTask::new(sample_image());
    let cancel = CancellationToken::new();

    orchestrator
        .run(&mut task, &observer, &cancel)
        .await
        .expect("first run should finish");
    let second = orchestrator.run(&mut task, &observer, &cancel).await;

    assert!(matches!(second, Err(OrchestratorError::Core(_))));
    assert_eq!(observer.completions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn upload_orchestration_tests_signed_out_run_attempts_demo_login_once() {
    let auth_transport = Arc::new(RefusingAuth::default());
    let session = Arc::new(SessionStore::in_memory());
    let authenticator = authenticator_with(session.clone(), auth_transport.clone());
    let orchestrator = UploadOrchestrator::new(
        Arc::new(ScriptedTransport::healthy()),
        authenticator,
        Arc::new(MockEngine::with_seed(MockTiming::instant(), 3)),
    );
    let observer = RecordingObserver::default();
    let mut task = UploadTask::new(sample_image());

    let outcome = orchestrator
        .run(&mut task, &observer, &CancellationToken::new())
        .await
        .expect("run should continue without a session");

    assert!(!outcome.is_mocked());
    assert_eq!(auth_transport.calls.load(Ordering::SeqCst), 1);
    assert!(!session.is_authenticated());
}
