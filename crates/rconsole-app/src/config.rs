use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use rconsole_repl::{Prompts, DEFAULT_CONTINUATION_PROMPT, DEFAULT_PROMPT};
use rconsole_terminal::{
    BridgeConfig, DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_BACKOFF_MS, DEFAULT_PTY_ERROR_BACKOFF_MS,
};

use crate::cli::Cli;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:7070";
pub const DEFAULT_MODULE: &str = "host";
pub const HISTORY_FILE_NAME: &str = ".rconsole_history";

/// Contents of the `--config` TOML file; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<String>,
    pub session_log: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub raw_mode: Option<bool>,
    pub module: Option<String>,
    pub chunk_size: Option<usize>,
    pub idle_backoff_ms: Option<u64>,
    pub pty_error_backoff_ms: Option<u64>,
    pub prompt: Option<String>,
    pub continuation_prompt: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Fully resolved settings for one console
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub listen: String,
    pub session_log: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub raw_mode: bool,
    pub module: String,
    pub chunk_size: usize,
    pub idle_backoff: Duration,
    pub pty_error_backoff: Duration,
    pub prompts: Prompts,
}

impl ConsoleConfig {
    /// CLI flag > environment (handled by clap) > config file > default
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let home = env::var_os("HOME").map(PathBuf::from);
        Self::merge(cli, file, home.as_deref())
    }

    pub fn merge(cli: &Cli, file: FileConfig, home: Option<&Path>) -> Result<Self> {
        let chunk_size = cli
            .chunk_size
            .or(file.chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }

        let pty_error_backoff_ms = cli
            .pty_error_backoff_ms
            .or(file.pty_error_backoff_ms)
            .unwrap_or(DEFAULT_PTY_ERROR_BACKOFF_MS);
        if pty_error_backoff_ms == 0 {
            bail!("pty_error_backoff_ms must be greater than zero");
        }

        Ok(Self {
            listen: cli
                .listen
                .clone()
                .or(file.listen)
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            session_log: cli.session_log.clone().or(file.session_log),
            history_file: cli
                .history_file
                .clone()
                .or(file.history_file)
                .or_else(|| home.map(|home| home.join(HISTORY_FILE_NAME))),
            raw_mode: cli.raw_mode.or(file.raw_mode).unwrap_or(true),
            module: cli
                .module
                .clone()
                .or(file.module)
                .unwrap_or_else(|| DEFAULT_MODULE.to_string()),
            chunk_size,
            idle_backoff: Duration::from_millis(
                cli.idle_backoff_ms
                    .or(file.idle_backoff_ms)
                    .unwrap_or(DEFAULT_IDLE_BACKOFF_MS),
            ),
            pty_error_backoff: Duration::from_millis(pty_error_backoff_ms),
            prompts: Prompts {
                primary: cli
                    .prompt
                    .clone()
                    .or(file.prompt)
                    .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
                continuation: cli
                    .continuation_prompt
                    .clone()
                    .or(file.continuation_prompt)
                    .unwrap_or_else(|| DEFAULT_CONTINUATION_PROMPT.to_string()),
            },
        })
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        let defaults = BridgeConfig::default();
        BridgeConfig {
            chunk_size: self.chunk_size,
            idle_backoff: self.idle_backoff,
            pty_error_backoff: self.pty_error_backoff,
            max_pty_error_backoff: defaults.max_pty_error_backoff.max(self.pty_error_backoff),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ConsoleConfig::merge(&Cli::default(), FileConfig::default(), Some(Path::new("/home/op"))).unwrap();

        assert_eq!(config.listen, DEFAULT_LISTEN);
        assert_eq!(config.session_log, None);
        assert_eq!(config.history_file, Some(PathBuf::from("/home/op/.rconsole_history")));
        assert!(config.raw_mode);
        assert_eq!(config.module, "host");
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.idle_backoff, Duration::from_secs(1));
        assert_eq!(config.pty_error_backoff, Duration::from_millis(10));
        assert_eq!(config.prompts, Prompts::default());
    }

    #[test]
    fn test_no_home_means_no_history_file() {
        let config = ConsoleConfig::merge(&Cli::default(), FileConfig::default(), None).unwrap();
        assert_eq!(config.history_file, None);
    }

    #[test]
    fn test_file_values_apply_and_cli_wins() {
        let file = write_config(
            r#"
listen = "0.0.0.0:8000"
raw_mode = false
module = "app"
chunk_size = 4096
prompt = "rc> "
"#,
        );
        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            listen: Some("127.0.0.1:9999".to_string()),
            ..Cli::default()
        };

        let config = ConsoleConfig::resolve(&cli).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9999");
        assert!(!config.raw_mode);
        assert_eq!(config.module, "app");
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.prompts.primary, "rc> ");
        assert_eq!(config.prompts.continuation, DEFAULT_CONTINUATION_PROMPT);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let file = write_config("listen_on = \"x\"\n");
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/rconsole.toml")),
            ..Cli::default()
        };
        assert!(ConsoleConfig::resolve(&cli).is_err());
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let cli = Cli {
            chunk_size: Some(0),
            ..Cli::default()
        };
        assert!(ConsoleConfig::merge(&cli, FileConfig::default(), None).is_err());
    }

    #[test]
    fn test_bridge_config_carries_backoffs() {
        let cli = Cli {
            idle_backoff_ms: Some(50),
            pty_error_backoff_ms: Some(5),
            chunk_size: Some(512),
            ..Cli::default()
        };
        let bridge = ConsoleConfig::merge(&cli, FileConfig::default(), None)
            .unwrap()
            .bridge_config();

        assert_eq!(bridge.chunk_size, 512);
        assert_eq!(bridge.idle_backoff, Duration::from_millis(50));
        assert_eq!(bridge.pty_error_backoff, Duration::from_millis(5));
        assert_eq!(bridge.max_pty_error_backoff, Duration::from_secs(1));
    }
}
