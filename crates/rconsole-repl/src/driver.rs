use std::io::Write;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use tracing::{debug, warn};

use crate::continuation::ContinuationAnalyzer;
use crate::evaluator::Evaluator;
use crate::line_source::{LineEvent, LineSource};

pub const DEFAULT_PROMPT: &str = ">>> ";
pub const DEFAULT_CONTINUATION_PROMPT: &str = "... ";

/// Pause before asking again after end of input or a line source failure
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub primary: String,
    pub continuation: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PROMPT.to_string(),
            continuation: DEFAULT_CONTINUATION_PROMPT.to_string(),
        }
    }
}

/// What a single turn of the console loop did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Blank line with nothing accumulated
    Skipped,
    /// Line accepted, expression still open
    Pending,
    /// Expression evaluated; holds the printed result, if any
    Evaluated(Option<String>),
    /// Expression failed; holds the reported message
    Failed(String),
    /// Ctrl-C discarded the pending expression
    Interrupted,
    EndOfInput,
    SourceError(String),
}

/// Reads lines, groups them into complete expressions and evaluates them.
pub struct ConsoleDriver<S, E> {
    source: S,
    evaluator: E,
    analyzer: ContinuationAnalyzer,
    pending: String,
    prompts: Prompts,
    out: Box<dyn Write + Send>,
    retry_delay: Duration,
}

impl<S: LineSource, E: Evaluator> ConsoleDriver<S, E> {
    pub fn new(source: S, evaluator: E, out: Box<dyn Write + Send>) -> Self {
        Self {
            source,
            evaluator,
            analyzer: ContinuationAnalyzer::new(),
            pending: String::new(),
            prompts: Prompts::default(),
            out,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Text accumulated for the expression being typed
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Serve the console forever. Errors are reported and the loop goes on.
    pub fn run(&mut self) {
        loop {
            let step = self.step();
            debug!(?step, "console step");
        }
    }

    pub fn step(&mut self) -> Step {
        let prompt = if self.pending.is_empty() {
            &self.prompts.primary
        } else {
            &self.prompts.continuation
        };

        match self.source.read_line(prompt) {
            Ok(LineEvent::Line(line)) => self.accept_line(&line),
            Ok(LineEvent::Interrupted) => {
                self.pending.clear();
                self.analyzer.reset();
                self.emit(&"^C".bright_black().to_string());
                Step::Interrupted
            }
            Ok(LineEvent::Eof) => {
                thread::sleep(self.retry_delay);
                Step::EndOfInput
            }
            Err(e) => {
                warn!(error = %e, "reading console input failed");
                self.emit(&format!("{} {}", "Error:".bright_red().bold(), e));
                thread::sleep(self.retry_delay);
                Step::SourceError(e.to_string())
            }
        }
    }

    fn accept_line(&mut self, line: &str) -> Step {
        if self.pending.is_empty() && line.trim().is_empty() {
            return Step::Skipped;
        }

        let (expr, needs_more) = self.analyzer.feed(&self.pending, line);
        if needs_more {
            self.pending = expr;
            return Step::Pending;
        }

        self.pending.clear();
        self.source.record(expr.trim_end_matches('\n'));
        self.evaluate(&expr)
    }

    fn evaluate(&mut self, expr: &str) -> Step {
        debug!(bytes = expr.len(), "evaluating expression");

        match self.evaluator.evaluate(expr) {
            Ok(Some(value)) => {
                let shown = value.to_string();
                self.emit(&shown);
                Step::Evaluated(Some(shown))
            }
            Ok(None) => Step::Evaluated(None),
            Err(e) => {
                let message = e.to_string();
                self.emit(&format!("{} {}", "error:".bright_red().bold(), message));
                Step::Failed(message)
            }
        }
    }

    fn emit(&mut self, text: &str) {
        let written = writeln!(self.out, "{}", text).and_then(|_| self.out.flush());
        if let Err(e) = written {
            warn!(error = %e, "failed to write console output");
        }
    }
}
