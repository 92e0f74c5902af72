//! Shared fakes for upload orchestration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nexis_analysis_contract::{AnalysisResult, AnalysisStatus, UploadSlot};
use nexis_auth::{
    AuthError, AuthTransport, Authenticator, LoginRequest, SessionStore, TokenPair, TokenResponse,
};
use nexis_core::{MediaFile, UploadPhase};
use nexis_mock::{MockEngine, MockTiming};
use nexis_upload::{
    ByteProgress, CompletionNotice, MediaTransport, UploadError, UploadObserver,
    UploadOrchestrator,
};
use url::Url;

/// How a fake step behaves.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(UploadError),
    Hang,
}

/// In-process transport with scripted steps and call counters.
#[derive(Debug)]
pub struct ScriptedTransport {
    pub slot: Step,
    pub transfer: Step,
    pub trigger: Step,
    pub slot_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub trigger_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(slot: Step, transfer: Step, trigger: Step) -> Self {
        Self {
            slot,
            transfer,
            trigger,
            slot_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            trigger_calls: AtomicUsize::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(Step::Succeed, Step::Succeed, Step::Succeed)
    }
}

async fn play(step: &Step) -> Result<(), UploadError> {
    match step {
        Step::Succeed => Ok(()),
        Step::Fail(error) => Err(error.clone()),
        Step::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }
}

#[async_trait]
impl MediaTransport for ScriptedTransport {
    async fn request_upload_slot(&self, _file: &MediaFile) -> Result<UploadSlot, UploadError> {
        self.slot_calls.fetch_add(1, Ordering::SeqCst);
        play(&self.slot).await?;
        Ok(UploadSlot {
            media_id: 42,
            upload_url: "http://storage.invalid/put/42".to_string(),
            expires_in: 3600,
        })
    }

    async fn transfer(
        &self,
        _slot: &UploadSlot,
        file: &MediaFile,
        progress: ByteProgress,
    ) -> Result<(), UploadError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        let total = file.size();
        progress(total / 2, total);
        play(&self.transfer).await?;
        progress(total, total);
        Ok(())
    }

    async fn trigger_analysis(&self, media_id: i64) -> Result<AnalysisResult, UploadError> {
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        play(&self.trigger).await?;
        Ok(AnalysisResult {
            analysis_id: Some(7),
            media_id: Some(media_id),
            status: AnalysisStatus::Processing,
            ..AnalysisResult::default()
        })
    }
}

/// Token endpoint that refuses every login and counts attempts.
#[derive(Debug, Default)]
pub struct RefusingAuth {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AuthTransport for RefusingAuth {
    async fn request_token(
        &self,
        _endpoint: &Url,
        _request: &LoginRequest,
    ) -> Result<TokenResponse, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AuthError::Rejected(401))
    }
}

/// Authenticator whose session already holds a token.
pub fn signed_in_authenticator() -> Arc<Authenticator> {
    let session = Arc::new(SessionStore::in_memory());
    session.save(&TokenPair::new("test-token", None));
    authenticator_with(session, Arc::new(RefusingAuth::default()))
}

pub fn authenticator_with(
    session: Arc<SessionStore>,
    transport: Arc<dyn AuthTransport>,
) -> Arc<Authenticator> {
    let base = Url::parse("http://backend.invalid").expect("base url should parse");
    Arc::new(
        Authenticator::for_base_url(&base, transport, session)
            .expect("authenticator should build"),
    )
}

pub fn orchestrator(transport: Arc<dyn MediaTransport>) -> UploadOrchestrator {
    UploadOrchestrator::new(
        transport,
        signed_in_authenticator(),
        Arc::new(MockEngine::with_seed(MockTiming::default(), 11)),
    )
}

pub fn sample_image() -> MediaFile {
    MediaFile::new("portrait.png", "image/png", vec![1_u8; 4096]).expect("png should validate")
}

/// Observer that records every event.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub phases: Mutex<Vec<UploadPhase>>,
    pub progress: Mutex<Vec<u8>>,
    pub completions: Mutex<Vec<CompletionNotice>>,
}

impl RecordingObserver {
    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().expect("progress lock").clone()
    }

    pub fn phases(&self) -> Vec<UploadPhase> {
        self.phases.lock().expect("phases lock").clone()
    }

    pub fn completions(&self) -> Vec<CompletionNotice> {
        self.completions.lock().expect("completions lock").clone()
    }
}

impl UploadObserver for RecordingObserver {
    fn on_phase(&self, phase: UploadPhase) {
        self.phases.lock().expect("phases lock").push(phase);
    }

    fn on_progress(&self, percent: u8) {
        self.progress.lock().expect("progress lock").push(percent);
    }

    fn on_complete(&self, notice: &CompletionNotice) {
        self.completions
            .lock()
            .expect("completions lock")
            .push(notice.clone());
    }
}

pub fn assert_monotonic(values: &[u8]) {
    assert!(
        values.windows(2).all(|pair| pair[0] < pair[1]),
        "progress should strictly increase: {values:?}"
    );
}
