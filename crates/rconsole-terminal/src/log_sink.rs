use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::error::{Result, TerminalError};

/// Append-only sink that mirrors every byte crossing the bridge
pub trait LogSink: Send + Sync {
    fn append(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Session log file opened in create-or-append mode
pub struct FileLogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogSink {
    /// Open (or create) the session log at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o644)
            .open(&path)
            .map_err(|source| TerminalError::LogSink {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(bytes)
    }
}

/// In-memory sink, handy for embedding hosts that want to inspect a session
#[derive(Default)]
pub struct MemoryLogSink {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far
    pub fn contents(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, bytes: &[u8]) -> io::Result<()> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
        Ok(())
    }
}
