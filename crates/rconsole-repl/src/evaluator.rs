use std::fmt::Display;

/// The language engine behind the console.
///
/// `evaluate` receives one complete expression (possibly spanning several
/// lines, newline-terminated). `Ok(None)` means the input produced nothing
/// worth printing, such as an assignment.
pub trait Evaluator {
    type Value: Display;
    type Error: Display;

    fn evaluate(&mut self, source: &str) -> Result<Option<Self::Value>, Self::Error>;
}
