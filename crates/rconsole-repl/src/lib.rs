//! Line-oriented console: decides when typed input forms a complete
//! expression, evaluates it and prints the outcome.

pub mod continuation;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod interp;
pub mod line_source;
pub mod output;

pub use continuation::{ContinuationAnalyzer, ContinuationState};
pub use driver::{ConsoleDriver, Prompts, Step, DEFAULT_CONTINUATION_PROMPT, DEFAULT_PROMPT};
pub use error::{ConsoleError, Result};
pub use evaluator::Evaluator;
pub use interp::{EvalError, Interpreter, Value};
pub use line_source::{EditorLineSource, LineEvent, LineSource};
pub use output::CrlfWriter;
