use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use portable_pty::{native_pty_system, MasterPty, PtySize, SlavePty};
use tracing::debug;

use super::error::{Result, TerminalError};

/// Blocking reader/writer halves of a pty master.
///
/// The bridge takes ownership of both; tests substitute any byte pipe.
pub struct PtyIo {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

impl PtyIo {
    pub fn new(reader: Box<dyn Read + Send>, writer: Box<dyn Write + Send>) -> Self {
        Self { reader, writer }
    }
}

/// Pseudo-terminal pair opened once at startup.
///
/// The master side feeds the bridge; the slave side is only ever handed to
/// stdio redirection. Dropping this closes both, so the owner keeps it alive
/// for the lifetime of the process.
pub struct PseudoTerminal {
    master: Box<dyn MasterPty + Send>,
    // Held so the slave device stays open even before stdio is rebound
    _slave: Box<dyn SlavePty + Send>,
    tty_path: Option<PathBuf>,
}

impl PseudoTerminal {
    /// Open a new pty pair with the given window size
    pub fn open(cols: u16, rows: u16) -> Result<Self> {
        let pty_system = native_pty_system();

        let pty_pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TerminalError::PtyOpen(e.to_string()))?;

        let tty_path = pty_pair.master.tty_name();
        debug!(tty = ?tty_path, cols, rows, "opened pseudo-terminal");

        Ok(Self {
            master: pty_pair.master,
            _slave: pty_pair.slave,
            tty_path,
        })
    }

    /// Take the master reader and writer for the bridge.
    ///
    /// The writer can only be taken once; a second call fails.
    pub fn take_io(&self) -> Result<PtyIo> {
        let reader = self
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::PtyIo(e.to_string()))?;
        let writer = self
            .master
            .take_writer()
            .map_err(|e| TerminalError::PtyIo(e.to_string()))?;

        Ok(PtyIo::new(reader, writer))
    }

    /// Open the slave device as a regular file handle for stdio redirection
    pub fn open_slave(&self) -> Result<File> {
        let path = self
            .tty_path
            .as_ref()
            .ok_or_else(|| TerminalError::SlaveOpen("slave device has no path".to_string()))?;

        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TerminalError::SlaveOpen(format!("{}: {}", path.display(), e)))
    }

    /// Raw descriptor of the master side, if the platform exposes one
    pub fn master_fd(&self) -> Option<RawFd> {
        self.master.as_raw_fd()
    }

    /// Path of the slave device (e.g. `/dev/pts/3`)
    pub fn tty_path(&self) -> Option<&Path> {
        self.tty_path.as_deref()
    }
}

impl std::fmt::Debug for PseudoTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoTerminal")
            .field("tty_path", &self.tty_path)
            .field("master_fd", &self.master_fd())
            .finish()
    }
}
