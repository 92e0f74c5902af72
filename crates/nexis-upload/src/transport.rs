//! Backend seam for the three upload steps and its HTTP implementation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use nexis_analysis::{AnalysisApi, HttpAnalysisApi};
use nexis_analysis_contract::{AnalysisResult, UploadSlot, parse_upload_slot};
use nexis_auth::{SessionStore, join_api_path};
use nexis_core::MediaFile;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::UploadError;

/// Route that issues upload slots.
pub const UPLOAD_SLOT_PATH: &str = "/api/v1/media/upload";
/// Size of each streamed body chunk.
pub const TRANSFER_CHUNK_BYTES: usize = 64 * 1024;

/// Byte-level transfer progress callback: `(bytes_sent, bytes_total)`.
pub type ByteProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Backend operations used by the upload orchestrator.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Asks the backend for a pre-signed upload destination.
    async fn request_upload_slot(&self, file: &MediaFile) -> Result<UploadSlot, UploadError>;

    /// Sends the file bytes to the slot, reporting byte progress.
    async fn transfer(
        &self,
        slot: &UploadSlot,
        file: &MediaFile,
        progress: ByteProgress,
    ) -> Result<(), UploadError>;

    /// Starts analysis of an uploaded file and returns the initial status.
    async fn trigger_analysis(&self, media_id: i64) -> Result<AnalysisResult, UploadError>;
}

/// `reqwest`-backed media transport.
///
/// Slot and trigger requests carry the current bearer token; the transfer
/// goes straight to the pre-signed URL without one. The trigger goes
/// through [`HttpAnalysisApi::start_analysis`].
#[derive(Clone)]
pub struct HttpMediaTransport {
    client: reqwest::Client,
    base_url: Url,
    session: Arc<SessionStore>,
    analysis: HttpAnalysisApi,
}

impl HttpMediaTransport {
    /// Creates a transport rooted at `base_url`.
    pub fn new(client: reqwest::Client, base_url: Url, session: Arc<SessionStore>) -> Self {
        let analysis = HttpAnalysisApi::new(client.clone(), base_url.clone(), session.clone());
        Self {
            client,
            base_url,
            session,
            analysis,
        }
    }

    fn slot_url(&self, file: &MediaFile) -> Url {
        let mut url = join_api_path(&self.base_url, UPLOAD_SLOT_PATH);
        url.query_pairs_mut()
            .append_pair("filename", file.name())
            .append_pair("file_size", &file.size().to_string())
            .append_pair("mime_type", file.mime_type());
        url
    }
}

impl fmt::Debug for HttpMediaTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMediaTransport")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MediaTransport for HttpMediaTransport {
    async fn request_upload_slot(&self, file: &MediaFile) -> Result<UploadSlot, UploadError> {
        let response = self
            .client
            .post(self.slot_url(file))
            .headers(self.session.auth_headers())
            .send()
            .await
            .map_err(map_request_error)?;

        let body = read_success_body(response).await?;
        let slot = parse_upload_slot(&body)
            .map_err(|error| UploadError::InvalidResponse(error.to_string()))?;
        debug!(media_id = slot.media_id, expires_in = slot.expires_in, "upload slot issued");
        Ok(slot)
    }

    async fn transfer(
        &self,
        slot: &UploadSlot,
        file: &MediaFile,
        progress: ByteProgress,
    ) -> Result<(), UploadError> {
        let target = Url::parse(&slot.upload_url)
            .map_err(|error| UploadError::InvalidResponse(format!("upload_url: {error}")))?;

        let bytes = file.bytes();
        let total = bytes.len() as u64;
        let chunks = split_chunks(&bytes, TRANSFER_CHUNK_BYTES);
        let mut sent = 0_u64;
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            progress(sent, total);
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let response = self
            .client
            .put(target)
            .header(CONTENT_TYPE, file.mime_type())
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(map_request_error)?;

        read_success_body(response).await.map(|_| ())
    }

    async fn trigger_analysis(&self, media_id: i64) -> Result<AnalysisResult, UploadError> {
        Ok(self.analysis.start_analysis(media_id).await?)
    }
}

fn split_chunks(bytes: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(chunk_size)
        .map(|start| bytes.slice(start..(start + chunk_size).min(bytes.len())))
        .collect()
}

async fn read_success_body(response: reqwest::Response) -> Result<String, UploadError> {
    let status = response.status();
    if !status.is_success() {
        debug!(status = %status, "backend rejected upload step");
        return Err(UploadError::from_status(status.as_u16()));
    }

    response.text().await.map_err(map_request_error)
}

fn map_request_error(error: reqwest::Error) -> UploadError {
    if error.is_timeout() {
        UploadError::Timeout
    } else {
        UploadError::Network(error.to_string())
    }
}
