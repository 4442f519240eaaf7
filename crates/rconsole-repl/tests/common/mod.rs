use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rconsole_repl::{ConsoleDriver, ConsoleError, Evaluator, LineEvent, LineSource};
use rustyline::error::ReadlineError;

/// Scripted input; records the prompts it was shown and the history entries
#[derive(Default)]
pub struct ScriptedSource {
    events: VecDeque<Result<LineEvent, String>>,
    pub prompts: Vec<String>,
    pub history: Vec<String>,
}

impl ScriptedSource {
    pub fn lines(lines: &[&str]) -> Self {
        let mut source = Self::default();
        for line in lines {
            source.push_line(line);
        }
        source
    }

    pub fn push_line(&mut self, line: &str) {
        self.events.push_back(Ok(LineEvent::Line(line.to_string())));
    }

    pub fn push_event(&mut self, event: LineEvent) {
        self.events.push_back(Ok(event));
    }

    pub fn push_error(&mut self, message: &str) {
        self.events.push_back(Err(message.to_string()));
    }
}

impl LineSource for ScriptedSource {
    fn read_line(&mut self, prompt: &str) -> rconsole_repl::Result<LineEvent> {
        self.prompts.push(prompt.to_string());
        match self.events.pop_front() {
            Some(Ok(event)) => Ok(event),
            Some(Err(message)) => Err(ConsoleError::LineEditor(ReadlineError::Io(
                io::Error::new(io::ErrorKind::Other, message),
            ))),
            None => Ok(LineEvent::Eof),
        }
    }

    fn record(&mut self, entry: &str) {
        self.history.push(entry.to_string());
    }
}

/// Shared in-memory console output
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Evaluator that remembers every expression and replies from a script
#[derive(Default)]
pub struct RecordingEvaluator {
    pub seen: Vec<String>,
    pub replies: VecDeque<Result<Option<String>, String>>,
}

impl Evaluator for RecordingEvaluator {
    type Value = String;
    type Error = String;

    fn evaluate(&mut self, source: &str) -> Result<Option<String>, String> {
        self.seen.push(source.to_string());
        self.replies.pop_front().unwrap_or(Ok(None))
    }
}

pub fn driver<E: Evaluator>(
    source: ScriptedSource,
    evaluator: E,
) -> (ConsoleDriver<ScriptedSource, E>, Captured) {
    let captured = Captured::default();
    let driver = ConsoleDriver::new(source, evaluator, Box::new(captured.clone()))
        .with_retry_delay(Duration::from_millis(1));
    (driver, captured)
}
