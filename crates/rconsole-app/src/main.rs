use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::info;

use rconsole::{logging, Cli, Console, ConsoleConfig, LogTarget};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Must happen before stdio is handed to the pseudo-terminal
    logging::init(&cli.log_level, LogTarget::choose(cli.log_into_session))?;

    let config = match ConsoleConfig::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
            std::process::exit(2);
        }
    };

    info!(listen = %config.listen, module = %config.module, "starting rconsole");

    let listen = config.listen.clone();
    Console::new(config)
        .export("version", env!("CARGO_PKG_VERSION"))
        .export("pid", i64::from(std::process::id()))
        .export("listen", listen)
        .serve()
        .await
}
