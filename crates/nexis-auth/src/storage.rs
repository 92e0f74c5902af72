//! Durable key/value backends for the session token pair.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::AuthError;

/// Storage key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Named-entry storage used to persist tokens across restarts.
pub trait TokenStorage: Send + Sync {
    /// Reads one entry.
    fn read(&self, key: &str) -> Result<Option<String>, AuthError>;
    /// Writes one entry, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<(), AuthError>;
    /// Removes one entry; missing entries are not an error.
    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// Process-local storage; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryTokenStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn read(&self, key: &str) -> Result<Option<String>, AuthError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// JSON file storage: one object whose fields are the named entries.
///
/// Every call re-reads the file so concurrent CLI invocations observe each
/// other's logins and logouts.
#[derive(Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileTokenStorage {
    /// Creates storage backed by `path`. The file is created lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, AuthError> {
        match fs::read(&self.path) {
            Ok(raw) if raw.is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|error| AuthError::Storage(format!("corrupt session file: {error}"))),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(error) => Err(AuthError::Storage(error.to_string())),
        }
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|error| AuthError::Storage(error.to_string()))?;
        }

        let raw = serde_json::to_vec_pretty(entries)
            .map_err(|error| AuthError::Storage(error.to_string()))?;
        let mut file = open_private(&self.path)?;
        file.write_all(&raw)
            .map_err(|error| AuthError::Storage(error.to_string()))
    }
}

/// Opens `path` for rewriting, readable by the owner only on unix.
fn open_private(path: &Path) -> Result<fs::File, AuthError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options
        .open(path)
        .map_err(|error| AuthError::Storage(error.to_string()))?;

    // `mode` only applies on creation; tighten files left by older builds.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|error| AuthError::Storage(error.to_string()))?;
    }
    Ok(file)
}

impl TokenStorage for FileTokenStorage {
    fn read(&self, key: &str) -> Result<Option<String>, AuthError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());
        self.store(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load().unwrap_or_default();
        if entries.remove(key).is_some() {
            self.store(&entries)?;
        }
        Ok(())
    }
}
