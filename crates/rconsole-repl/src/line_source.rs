use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, warn};

use crate::error::Result;

/// One outcome of asking the user for a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    /// Ctrl-C
    Interrupted,
    /// Ctrl-D or end of input
    Eof,
}

/// Where the console gets its input from
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Result<LineEvent>;

    /// Remember a completed expression
    fn record(&mut self, entry: &str);
}

/// Interactive line editing backed by rustyline, with a persistent history file
pub struct EditorLineSource {
    editor: DefaultEditor,
    history_path: Option<PathBuf>,
}

impl EditorLineSource {
    pub fn new(history_path: Option<PathBuf>) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;

        if let Some(path) = &history_path {
            load_history(&mut editor, path);
        }

        Ok(Self {
            editor,
            history_path,
        })
    }
}

fn load_history(editor: &mut DefaultEditor, path: &Path) {
    match editor.load_history(path) {
        Ok(()) => debug!(path = %path.display(), "history loaded"),
        Err(ReadlineError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no history file yet");
        }
        Err(e) => warn!(path = %path.display(), error = %e, "failed to load history"),
    }
}

impl LineSource for EditorLineSource {
    fn read_line(&mut self, prompt: &str) -> Result<LineEvent> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(LineEvent::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(LineEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(LineEvent::Eof),
            Err(e) => Err(e.into()),
        }
    }

    fn record(&mut self, entry: &str) {
        if let Err(e) = self.editor.add_history_entry(entry) {
            warn!(error = %e, "failed to add history entry");
            return;
        }

        // Persisted after every entry
        if let Some(path) = &self.history_path {
            if let Err(e) = self.editor.save_history(path) {
                warn!(path = %path.display(), error = %e, "failed to save history");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_persists_history_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history");

        let mut source = EditorLineSource::new(Some(path.clone())).unwrap();
        source.record("x = 1");
        source.record("if x {\n  2\n}");

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("x = 1"), "history file: {saved:?}");
    }

    #[test]
    fn test_missing_history_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let source = EditorLineSource::new(Some(dir.path().join("absent")));
        assert!(source.is_ok());
    }
}
