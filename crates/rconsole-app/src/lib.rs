// rconsole application: CLI, configuration, logging and the serve sequence

pub mod cli;
pub mod config;
pub mod logging;
pub mod serve;

pub use cli::Cli;
pub use config::{ConsoleConfig, FileConfig};
pub use logging::LogTarget;
pub use serve::{serve_with, Console};
