use std::fs::File;
use std::io;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Where diagnostics go once stdio belongs to the pseudo-terminal
pub enum LogTarget {
    /// A copy of the original stderr taken before redirection
    Detached(File),
    /// Whatever fd 2 is at the time of writing, i.e. the console session
    Session,
}

impl LogTarget {
    /// Detached by default; falls back to the session if stderr cannot be duplicated
    pub fn choose(log_into_session: bool) -> Self {
        if log_into_session {
            return LogTarget::Session;
        }
        match rconsole_terminal::duplicate_stderr() {
            Ok(file) => LogTarget::Detached(file),
            Err(e) => {
                eprintln!("rconsole: cannot duplicate stderr ({}), logging into the session", e);
                LogTarget::Session
            }
        }
    }
}

pub fn default_filter(level: &str) -> String {
    let level = level.to_lowercase();
    format!(
        "rconsole={level},rconsole_terminal={level},rconsole_repl={level}",
        level = level
    )
}

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
pub fn init(level: &str, target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = match target {
        LogTarget::Detached(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
        LogTarget::Session => builder.with_writer(io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_covers_workspace_crates() {
        assert_eq!(
            default_filter("DEBUG"),
            "rconsole=debug,rconsole_terminal=debug,rconsole_repl=debug"
        );
    }

    #[test]
    fn test_session_target_when_requested() {
        assert!(matches!(LogTarget::choose(true), LogTarget::Session));
    }
}
