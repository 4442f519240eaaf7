//! Decides whether a partially typed expression needs more lines.
//!
//! The analyzer scans each new line once, tracking brace depth, backtick raw
//! strings and short quotes across lines. When everything is closed it looks
//! at the last character of the line to catch trailing operators.

/// Characters that end a statement; a trailing `+`/`-` continues only when
/// it is not doubled (`x+` continues, `x++` does not)
const NEVER_CONTINUE: &[u8] = b"+-})];";

/// Trailing characters that always ask for another line
const ALWAYS_CONTINUE: &[u8] = b"([=,*/%|&<>^.:";

/// Characters that change scanner state
const SCAN_SET: &[u8] = b"{}`'\"";

/// Scanner state carried between lines of one expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinuationState {
    /// Unmatched `{` count; may go negative on stray `}`
    pub depth: i32,
    /// Inside a backtick raw string
    pub in_raw: bool,
    /// Inside a `'` or `"` string left open at the end of a line
    pub open_quote: Option<u8>,
}

impl ContinuationState {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Incremental line-completeness checker, one per console session
#[derive(Debug, Default)]
pub struct ContinuationAnalyzer {
    state: ContinuationState,
}

impl ContinuationAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `line` to `accumulated` and report whether more input is needed.
    ///
    /// The line and a trailing newline are always appended. Once the result
    /// says no more input is needed the state resets for the next expression.
    pub fn feed(&mut self, accumulated: &str, line: &str) -> (String, bool) {
        let mut expr = String::with_capacity(accumulated.len() + line.len() + 1);
        expr.push_str(accumulated);
        expr.push_str(line);
        expr.push('\n');

        let needs_more = self.scan(line.as_bytes());
        if !needs_more {
            self.reset();
        }

        (expr, needs_more)
    }

    pub fn state(&self) -> &ContinuationState {
        &self.state
    }

    /// Forget any partial expression (e.g. after Ctrl-C)
    pub fn reset(&mut self) {
        self.state = ContinuationState::default();
    }

    fn scan(&mut self, line: &[u8]) -> bool {
        let mut rest = line;

        loop {
            if let Some(quote) = self.state.open_quote {
                match find_closing(rest, quote) {
                    Some(pos) => {
                        self.state.open_quote = None;
                        rest = &rest[pos + 1..];
                    }
                    None => return true,
                }
            }

            if self.state.in_raw {
                match rest.iter().position(|&b| b == b'`') {
                    Some(pos) => {
                        self.state.in_raw = false;
                        rest = &rest[pos + 1..];
                    }
                    None => return true,
                }
            }

            let Some(pos) = rest.iter().position(|b| SCAN_SET.contains(b)) else {
                if self.state.depth != 0 {
                    return true;
                }
                return trailing_continues(trim_trailing_blanks(line));
            };

            match rest[pos] {
                b'{' => self.state.depth += 1,
                b'}' => self.state.depth -= 1,
                b'`' => self.state.in_raw = true,
                quote => self.state.open_quote = Some(quote),
            }
            rest = &rest[pos + 1..];
        }
    }
}

/// Position of the closing `quote`, skipping backslash-escaped bytes
fn find_closing(line: &[u8], quote: u8) -> Option<usize> {
    let mut i = 0;
    while i < line.len() {
        match line[i] {
            b if b == quote => return Some(i),
            b'\\' => i += 1,
            _ => {}
        }
        i += 1;
    }
    None
}

fn trim_trailing_blanks(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(0, |pos| pos + 1);
    &line[..end]
}

/// Trailing-operator heuristic for a line with nothing left open
fn trailing_continues(line: &[u8]) -> bool {
    let Some((&last, head)) = line.split_last() else {
        return false;
    };

    if NEVER_CONTINUE.contains(&last) {
        return matches!(last, b'+' | b'-') && head.last().is_some_and(|&prev| prev != last);
    }

    ALWAYS_CONTINUE.contains(&last)
}
