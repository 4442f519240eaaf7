use std::path::PathBuf;

use clap::Parser;

/// CLI arguments for rconsole
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "rconsole")]
#[command(about = "Interactive console served over TCP through a pseudo-terminal")]
#[command(version)]
pub struct Cli {
    /// Address to accept console clients on (e.g. 127.0.0.1:7070)
    #[arg(short, long, env = "RCONSOLE_LISTEN", value_name = "ADDR")]
    pub listen: Option<String>,

    /// Append everything sent and received to this file
    #[arg(long, env = "RCONSOLE_SESSION_LOG", value_name = "PATH")]
    pub session_log: Option<PathBuf>,

    /// Line editor history file
    #[arg(long, env = "RCONSOLE_HISTORY_FILE", value_name = "PATH")]
    pub history_file: Option<PathBuf>,

    /// Put the pseudo-terminal into raw mode at startup
    #[arg(long, env = "RCONSOLE_RAW_MODE", value_name = "BOOL")]
    pub raw_mode: Option<bool>,

    /// Module name under which host values are visible to expressions
    #[arg(long, env = "RCONSOLE_MODULE", value_name = "NAME")]
    pub module: Option<String>,

    /// Relay buffer size in bytes
    #[arg(long, env = "RCONSOLE_CHUNK_SIZE", value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Sleep while no client is attached
    #[arg(long, env = "RCONSOLE_IDLE_BACKOFF_MS", value_name = "MS")]
    pub idle_backoff_ms: Option<u64>,

    /// First delay after a pseudo-terminal I/O error (doubles up to 1s)
    #[arg(long, env = "RCONSOLE_PTY_ERROR_BACKOFF_MS", value_name = "MS")]
    pub pty_error_backoff_ms: Option<u64>,

    #[arg(long, env = "RCONSOLE_PROMPT", value_name = "TEXT")]
    pub prompt: Option<String>,

    #[arg(long, env = "RCONSOLE_CONTINUATION_PROMPT", value_name = "TEXT")]
    pub continuation_prompt: Option<String>,

    /// TOML file with defaults for any of the options above
    #[arg(short, long, env = "RCONSOLE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "RCONSOLE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Write diagnostics into the console session instead of the original stderr
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub log_into_session: bool,
}
