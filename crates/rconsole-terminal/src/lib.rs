// Remote console terminal plumbing
//
// This crate owns the pseudo-terminal that the console runs on and relays its
// byte stream to whichever network client is currently attached.

mod bridge;
mod error;
mod listener;
mod log_sink;
mod pty;
mod raw_mode;
mod slot;
mod stdio;
mod stream;

// Re-export public API
pub use bridge::{Bridge, BridgeConfig, BridgeStats};
pub use error::{Result, TerminalError};
pub use listener::Acceptor;
pub use log_sink::{FileLogSink, LogSink, MemoryLogSink};
pub use pty::{PseudoTerminal, PtyIo};
pub use raw_mode::make_raw;
pub use slot::{Connection, ConnectionSlot};
pub use stdio::{duplicate_stderr, redirect_stdio};
pub use stream::SessionStream;

// Constants
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_IDLE_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_PTY_ERROR_BACKOFF_MS: u64 = 10;
pub const MAX_PTY_ERROR_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_PTY_WRITE_ATTEMPTS: u32 = 3;
pub const DEFAULT_PTY_COLS: u16 = 80;
pub const DEFAULT_PTY_ROWS: u16 = 24;
