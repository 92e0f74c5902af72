#![warn(missing_docs)]
//! # nexis-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `dark-nexis` workspace.
//!
//! ## Responsibilities
//! - Represent user-selected media files and validate them before any
//!   network call is attempted.
//! - Model one upload task and its legal phase transitions.
//! - Keep upload progress monotonic and bounded to `[0, 100]`.
//!
//! ## Data flow
//! Callers build a [`MediaFile`] (validated at construction), wrap it in an
//! [`UploadTask`], and hand the task to the upload orchestrator, which drives
//! [`UploadTask::transition`] and [`UploadTask::advance_progress`].
//!
//! ## Ownership and lifetimes
//! Media bytes are held in [`bytes::Bytes`] so the transfer stage can stream
//! them without copying and without borrowing from the task.
//!
//! ## Error model
//! Validation and state-machine violations return [`CoreError`] variants.
//!
//! ## Security and privacy notes
//! User file names are not meant for logs. Use [`MediaFile::fingerprint`] when
//! a stable, non-identifying reference to a file is needed.
//!
//! ## Example
//! ```rust
//! use nexis_core::{MediaFile, UploadPhase, UploadTask};
//!
//! let file = MediaFile::new("clip.mp4", "video/mp4", vec![0_u8; 16]).unwrap();
//! let mut task = UploadTask::new(file);
//! task.transition(UploadPhase::RequestingSlot).unwrap();
//! assert_eq!(task.advance_progress(25), Some(25));
//! assert_eq!(task.advance_progress(10), None);
//! ```

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Upper bound on accepted media size (100 MiB).
pub const MAX_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Progress reached once the backend issued an upload slot.
pub const PROGRESS_SLOT_ACQUIRED: u8 = 25;
/// Share of overall progress covered by the byte transfer.
pub const PROGRESS_TRANSFER_SPAN: u8 = 50;
/// Progress reached once the byte transfer finished.
pub const PROGRESS_TRANSFERRED: u8 = 75;
/// Terminal progress value.
pub const PROGRESS_COMPLETE: u8 = 100;
/// Fixed checkpoints walked by simulated uploads.
pub const PROGRESS_CHECKPOINTS: [u8; 4] = [
    PROGRESS_SLOT_ACQUIRED,
    PROGRESS_SLOT_ACQUIRED + PROGRESS_TRANSFER_SPAN / 2,
    PROGRESS_TRANSFERRED,
    PROGRESS_COMPLETE,
];

/// MIME types accepted for analysis.
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/x-msvideo",
    "video/avi",
    "video/quicktime",
    "video/webm",
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/mp4",
    "audio/x-m4a",
    "audio/m4a",
    "audio/ogg",
];

/// Broad media family of an accepted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
    /// Audio clip.
    Audio,
}

impl MediaKind {
    /// Resolves the media kind for an accepted MIME type.
    ///
    /// Returns `None` for anything outside [`ACCEPTED_MIME_TYPES`].
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let normalized = normalize_mime(mime_type);
        if !ACCEPTED_MIME_TYPES.contains(&normalized.as_str()) {
            return None;
        }

        match normalized.split('/').next() {
            Some("image") => Some(Self::Image),
            Some("video") => Some(Self::Video),
            Some("audio") => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Maps a file extension (with or without leading dot) to its MIME type.
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        _ => return None,
    };
    Some(mime)
}

/// Validates submission attributes without touching file contents.
///
/// # Errors
/// Returns [`CoreError::EmptyFileName`], [`CoreError::UnsupportedMediaType`]
/// or [`CoreError::FileTooLarge`].
pub fn validate_submission(name: &str, mime_type: &str, size: u64) -> Result<MediaKind, CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::EmptyFileName);
    }

    let kind = MediaKind::from_mime(mime_type)
        .ok_or_else(|| CoreError::UnsupportedMediaType(mime_type.to_string()))?;

    if size > MAX_FILE_SIZE_BYTES {
        return Err(CoreError::FileTooLarge {
            size,
            limit: MAX_FILE_SIZE_BYTES,
        });
    }

    Ok(kind)
}

/// A validated, in-memory media file selected for analysis.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaFile {
    name: String,
    mime_type: String,
    kind: MediaKind,
    bytes: Bytes,
}

impl MediaFile {
    /// Constructs a validated media file.
    ///
    /// # Errors
    /// See [`validate_submission`].
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        let mime_type = normalize_mime(&mime_type.into());
        let bytes = bytes.into();
        let kind = validate_submission(&name, &mime_type, bytes.len() as u64)?;

        Ok(Self {
            name,
            mime_type,
            kind,
            bytes,
        })
    }

    /// Loads a media file from disk, inferring the MIME type from its
    /// extension.
    ///
    /// # Errors
    /// Returns [`CoreError::UnsupportedExtension`] for unknown extensions,
    /// [`CoreError::FileTooLarge`] before reading oversized files, and
    /// [`CoreError::Io`] for filesystem failures.
    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default();
        let mime_type = mime_for_extension(extension)
            .ok_or_else(|| CoreError::UnsupportedExtension(extension.to_string()))?;

        let size = std::fs::metadata(path)?.len();
        if size > MAX_FILE_SIZE_BYTES {
            return Err(CoreError::FileTooLarge {
                size,
                limit: MAX_FILE_SIZE_BYTES,
            });
        }

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let bytes = std::fs::read(path)?;
        Self::new(name, mime_type, bytes)
    }

    /// User-facing file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized MIME type.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Media family derived from the MIME type.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Shared handle to the file contents.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// SHA-256 hex digest of the file contents.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("mime_type", &self.mime_type)
            .field("kind", &self.kind)
            .field("size", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Renders a byte count as `Bytes`, `KB`, `MB` or `GB` with at most two
/// decimals.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{rendered} {}", UNITS[unit])
}

/// Maps transferred bytes onto the overall progress scale (`25..=75`).
pub fn transfer_progress(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return PROGRESS_TRANSFERRED;
    }

    let fraction = loaded.min(total) as f64 / total as f64;
    PROGRESS_SLOT_ACQUIRED + (fraction * f64::from(PROGRESS_TRANSFER_SPAN)).round() as u8
}

/// Monotonic progress counter bounded to `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    percent: u8,
}

impl ProgressTracker {
    /// Creates a tracker at 0%.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current progress value.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Moves progress forward.
    ///
    /// # Returns
    /// `Some(new_value)` when progress increased, `None` when `to` is not
    /// above the current value. Values above 100 are clamped.
    pub fn advance(&mut self, to: u8) -> Option<u8> {
        let to = to.min(PROGRESS_COMPLETE);
        if to > self.percent {
            self.percent = to;
            return Some(to);
        }
        None
    }

    /// Returns `true` once progress reached 100.
    pub fn is_complete(&self) -> bool {
        self.percent == PROGRESS_COMPLETE
    }

    fn reset(&mut self) {
        self.percent = 0;
    }
}

/// Lifecycle phase of one upload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadPhase {
    /// No work in progress.
    Idle,
    /// Asking the backend for an upload slot.
    RequestingSlot,
    /// Streaming bytes to the slot URL.
    Transferring,
    /// Asking the backend to start analysis.
    TriggeringAnalysis,
    /// Waiting for the backend analysis to reach a terminal status.
    Polling,
    /// Upload pipeline (or analysis) finished successfully.
    Completed,
    /// Analysis reported a terminal failure.
    Failed,
    /// Backend was unavailable and the simulated path took over.
    Mocked,
}

impl UploadPhase {
    /// Returns `true` for phases that end the task.
    ///
    /// `Completed` may still move to `Polling` when a backend analysis is
    /// pending.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Mocked)
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::RequestingSlot => "requesting-slot",
            Self::Transferring => "transferring",
            Self::TriggeringAnalysis => "triggering-analysis",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Mocked => "mocked",
        };
        f.write_str(label)
    }
}

/// Returns `true` when `from -> to` is an allowed task transition.
pub fn is_legal_transition(from: UploadPhase, to: UploadPhase) -> bool {
    use UploadPhase::*;

    matches!(
        (from, to),
        (_, Idle)
            | (Idle, RequestingSlot)
            | (RequestingSlot, Transferring | Mocked)
            | (Transferring, TriggeringAnalysis | Mocked)
            | (TriggeringAnalysis, Completed | Mocked)
            | (Completed, Polling)
            | (Polling, Completed | Failed)
    )
}

/// One submitted file moving through upload and analysis.
#[derive(Debug, Clone)]
pub struct UploadTask {
    file: MediaFile,
    remote_media_id: Option<i64>,
    progress: ProgressTracker,
    phase: UploadPhase,
    notified: bool,
}

impl UploadTask {
    /// Creates an idle task for a validated file.
    pub fn new(file: MediaFile) -> Self {
        Self {
            file,
            remote_media_id: None,
            progress: ProgressTracker::new(),
            phase: UploadPhase::Idle,
            notified: false,
        }
    }

    /// File being uploaded.
    pub fn file(&self) -> &MediaFile {
        &self.file
    }

    /// Backend media id, once a slot was issued.
    pub fn remote_media_id(&self) -> Option<i64> {
        self.remote_media_id
    }

    /// Records the backend media id.
    pub fn set_remote_media_id(&mut self, media_id: i64) {
        self.remote_media_id = Some(media_id);
    }

    /// Current progress value.
    pub fn progress(&self) -> u8 {
        self.progress.percent()
    }

    /// Current phase.
    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Advances progress; see [`ProgressTracker::advance`].
    pub fn advance_progress(&mut self, to: u8) -> Option<u8> {
        self.progress.advance(to)
    }

    /// Applies a phase transition.
    ///
    /// # Errors
    /// Returns [`CoreError::IllegalTransition`] when the move is not allowed;
    /// the task is left unchanged.
    pub fn transition(&mut self, next: UploadPhase) -> Result<(), CoreError> {
        if !is_legal_transition(self.phase, next) {
            return Err(CoreError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }

        if next == UploadPhase::Idle {
            self.reset();
        } else {
            self.phase = next;
        }
        Ok(())
    }

    /// Claims the single completion notification for this task.
    ///
    /// Returns `true` on the first call only.
    pub fn mark_notified(&mut self) -> bool {
        !std::mem::replace(&mut self.notified, true)
    }

    /// Returns the task to idle, discarding progress and backend identity.
    pub fn reset(&mut self) {
        self.phase = UploadPhase::Idle;
        self.remote_media_id = None;
        self.progress.reset();
        self.notified = false;
    }
}

/// Error type for media validation and task state violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// File name is missing.
    #[error("file name is empty")]
    EmptyFileName,
    /// MIME type is outside the accepted set.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    /// File extension does not map to an accepted MIME type.
    #[error("unsupported file extension: {0:?}")]
    UnsupportedExtension(String),
    /// File exceeds the size cap.
    #[error("file size {size} exceeds the {limit} byte limit")]
    FileTooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Maximum size in bytes.
        limit: u64,
    },
    /// Task phase change is not allowed.
    #[error("illegal upload transition {from} -> {to}")]
    IllegalTransition {
        /// Phase before the attempted transition.
        from: UploadPhase,
        /// Requested phase.
        to: UploadPhase,
    },
    /// Filesystem failure while loading media.
    #[error("media read failure: {0}")]
    Io(#[from] std::io::Error),
}

fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
