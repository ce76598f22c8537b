//! Durable slots holding the device store as one JSON document.
//!
//! A [`KeyValueSlot`] stores a single string.  The store never edits it in
//! place: every flush replaces the whole document.  A document the store
//! could not make sense of is copied aside with [`KeyValueSlot::back_up`]
//! before it is replaced.
//!
//! - [`FileSlot`] writes to a temporary file and renames it over the target,
//!   so a crash mid-write leaves the previous document intact.
//! - [`MemorySlot`] keeps the document in memory, for tests and throwaway
//!   sessions.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Error type for slot and store persistence.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed device store: {0}")]
    Json(#[from] serde_json::Error),

    /// The slot cannot be used at all (e.g. a backend that is offline).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The stored record for this device could not be decoded, so it is
    /// left as it is rather than overwritten.
    #[error("stored record for {0} could not be decoded")]
    UndecodableRecord(String),
}

/// A single durable string value.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueSlot: Send + Sync {
    /// Returns the stored document, or `None` if nothing was ever written.
    fn read(&self) -> Result<Option<String>, StorageError>;

    /// Replaces the stored document.
    fn write(&self, contents: &str) -> Result<(), StorageError>;

    /// Keeps a copy of `contents` next to the document, replacing any
    /// earlier copy.
    fn back_up(&self, contents: &str) -> Result<(), StorageError>;
}

// ── FileSlot ──────────────────────────────────────────────────────────────────

/// A slot backed by one file.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    /// Where [`back_up`](KeyValueSlot::back_up) puts its copy.
    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".bak")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn io_error(path: &Path, source: io::Error) -> StorageError {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl KeyValueSlot for FileSlot {
    fn read(&self) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&self.path, e)),
        }
    }

    fn write(&self, contents: &str) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| Self::io_error(dir, e))?;
        }
        let tmp = self.tmp_path();
        std::fs::write(&tmp, contents).map_err(|e| Self::io_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Self::io_error(&self.path, e))
    }

    fn back_up(&self, contents: &str) -> Result<(), StorageError> {
        let backup = self.backup_path();
        std::fs::write(&backup, contents).map_err(|e| Self::io_error(&backup, e))
    }
}

// ── MemorySlot ────────────────────────────────────────────────────────────────

/// A slot held in memory.  Clones share the same document.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    contents: Arc<Mutex<Option<String>>>,
    backup: Arc<Mutex<Option<String>>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that already holds `contents`.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(Some(contents.into()))),
            backup: Arc::default(),
        }
    }

    /// The current document, if any.
    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The last copy made by `back_up`, if any.
    pub fn backup(&self) -> Option<String> {
        self.backup.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl KeyValueSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.contents())
    }

    fn write(&self, contents: &str) -> Result<(), StorageError> {
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = Some(contents.to_string());
        Ok(())
    }

    fn back_up(&self, contents: &str) -> Result<(), StorageError> {
        *self.backup.lock().unwrap_or_else(PoisonError::into_inner) = Some(contents.to_string());
        Ok(())
    }
}
