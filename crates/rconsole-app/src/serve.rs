use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use rconsole_repl::{ConsoleDriver, CrlfWriter, EditorLineSource, Evaluator, Interpreter, Value};
use rconsole_terminal::{
    make_raw, redirect_stdio, Acceptor, Bridge, FileLogSink, LogSink, PseudoTerminal,
    DEFAULT_PTY_COLS, DEFAULT_PTY_ROWS,
};

use crate::config::ConsoleConfig;

/// A console with the built-in interpreter and the values the host exports to it
pub struct Console {
    config: ConsoleConfig,
    interpreter: Interpreter,
}

impl Console {
    pub fn new(config: ConsoleConfig) -> Self {
        Self {
            config,
            interpreter: Interpreter::new(),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Expose `value` to expressions as `<module>.<name>`
    pub fn export(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.interpreter.export(&self.config.module, name, value);
        self
    }

    pub fn export_fn<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, rconsole_repl::EvalError> + Send + Sync + 'static,
    {
        self.interpreter.export_fn(&self.config.module, name, f);
        self
    }

    pub async fn serve(self) -> Result<()> {
        let Console {
            config,
            mut interpreter,
        } = self;
        interpreter.set_output(console_output(config.raw_mode));
        serve_with(config, interpreter).await
    }
}

/// Bind, open the pseudo-terminal, take over stdio and run the console with `evaluator`.
///
/// Only returns on a startup failure or if the console thread dies.
pub async fn serve_with<E>(config: ConsoleConfig, evaluator: E) -> Result<()>
where
    E: Evaluator + Send + 'static,
{
    let sink: Option<Arc<dyn LogSink>> = match &config.session_log {
        Some(path) => {
            let sink = FileLogSink::open(path).context("Failed to open session log")?;
            info!(path = %path.display(), "mirroring session to log file");
            Some(Arc::new(sink))
        }
        None => None,
    };

    let acceptor = Acceptor::bind(&config.listen).await?;

    let pty = PseudoTerminal::open(DEFAULT_PTY_COLS, DEFAULT_PTY_ROWS)?;
    let slave = pty.open_slave()?;
    if config.raw_mode {
        enter_raw_mode(&pty, slave.as_raw_fd());
    }

    let io = pty.take_io()?;
    let bridge = Bridge::start(io, sink, config.bridge_config())?;

    redirect_stdio(&slave).context("Failed to attach stdio to the pseudo-terminal")?;
    info!(
        addr = %acceptor.local_addr(),
        tty = ?pty.tty_path(),
        "console ready"
    );

    tokio::spawn(accept_forever(acceptor, bridge));

    let history_file = config.history_file.clone();
    let prompts = config.prompts.clone();
    let raw_mode = config.raw_mode;
    let console = tokio::task::spawn_blocking(move || -> Result<()> {
        let source = EditorLineSource::new(history_file).context("Failed to start line editor")?;
        ConsoleDriver::new(source, evaluator, console_output(raw_mode))
            .with_prompts(prompts)
            .run();
        Ok(())
    });

    let outcome = console.await.context("Console thread panicked")?;

    // The pty must outlive the console thread
    drop(pty);
    outcome
}

async fn accept_forever(acceptor: Acceptor, bridge: Bridge) {
    if let Err(e) = acceptor.run(bridge).await {
        error!(error = %e, "no longer accepting console clients");
    }
}

/// Raw mode failures leave the terminal cooked and are not fatal
fn enter_raw_mode(pty: &PseudoTerminal, slave_fd: RawFd) {
    if let Err(e) = make_raw(slave_fd) {
        warn!(error = %e, "continuing with the console side in cooked mode");
    }
    match pty.master_fd() {
        Some(fd) => {
            if let Err(e) = make_raw(fd) {
                warn!(error = %e, "continuing with the network side in cooked mode");
            }
        }
        None => warn!("pseudo-terminal master has no descriptor; leaving it as is"),
    }
}

fn console_output(raw_mode: bool) -> Box<dyn Write + Send> {
    if raw_mode {
        Box::new(CrlfWriter::new(io::stdout()))
    } else {
        Box::new(io::stdout())
    }
}
