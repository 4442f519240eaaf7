use rustyline::error::ReadlineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("line editor error: {0}")]
    LineEditor(#[from] ReadlineError),
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
