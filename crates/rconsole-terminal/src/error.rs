use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the terminal layer.
///
/// Transport and pty I/O failures inside the relay loops are logged and
/// absorbed; only setup failures and fatal accept conditions reach callers.
#[derive(Error, Debug)]
pub enum TerminalError {
    /// The OS refused to allocate a pseudo-terminal pair
    #[error("failed to open pseudo-terminal: {0}")]
    PtyOpen(String),

    /// The master side could not be split into reader/writer halves
    #[error("failed to take pseudo-terminal I/O handles: {0}")]
    PtyIo(String),

    /// The slave device could not be located or opened
    #[error("failed to open pseudo-terminal slave: {0}")]
    SlaveOpen(String),

    /// Switching a handle to raw mode failed
    #[error("failed to set raw mode on fd {fd}: {source}")]
    RawMode {
        fd: i32,
        #[source]
        source: io::Error,
    },

    /// Rebinding stdin/stdout/stderr failed
    #[error("failed to redirect stdio: {0}")]
    Redirect(#[source] io::Error),

    /// The session log was requested but could not be opened
    #[error("failed to open session log {path}: {source}")]
    LogSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Accepting failed because the process ran out of descriptors or memory
    #[error("accept failed with resource exhaustion: {0}")]
    AcceptExhausted(#[source] io::Error),

    /// Relay thread could not be spawned
    #[error("failed to spawn relay thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Result type alias for terminal operations
pub type Result<T> = std::result::Result<T, TerminalError>;
