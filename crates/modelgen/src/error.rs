//! Fatal error type shared by the tokenizer, parser and evaluator.
//!
//! Every failure in a ModelGen program is fatal: the error carries the kind,
//! a message, the source location of the offending token or node, and the
//! call-stack traceback captured when the error was raised. The library
//! propagates errors with `?`; deciding the process exit code is the
//! embedder's job (the CLI prints the `Display` form and exits non-zero).

use std::fmt;

use strum::IntoStaticStr;

use crate::tokenize::Pos;

/// Result alias used throughout the interpreter.
pub type RunResult<T> = Result<T, Error>;

/// Error cause taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum ErrorKind {
    #[strum(serialize = "I/O error")]
    Io,
    #[strum(serialize = "lexical error")]
    Lexical,
    #[strum(serialize = "syntax error")]
    Syntax,
    #[strum(serialize = "name error")]
    Name,
    #[strum(serialize = "type error")]
    Type,
    #[strum(serialize = "argument error")]
    Argument,
    #[strum(serialize = "division by zero")]
    ZeroDivision,
    #[strum(serialize = "arithmetic overflow")]
    Overflow,
    #[strum(serialize = "index error")]
    Index,
    #[strum(serialize = "attribute error")]
    Attribute,
    #[strum(serialize = "format error")]
    Format,
    #[strum(serialize = "import error")]
    Import,
    #[strum(serialize = "emit error")]
    Emit,
    #[strum(serialize = "assertion failed")]
    Assertion,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).into())
    }
}

/// A resolved source location: file, 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLoc {
    pub filename: String,
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    pub fn new(filename: &str, pos: Pos) -> Self {
        Self {
            filename: filename.to_owned(),
            line: pos.line,
            column: pos.column,
        }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// One traceback entry: the callee name (if the call site had one) and the
/// caller's source location.
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub name: Option<String>,
    pub loc: Option<CodeLoc>,
}

/// A fatal ModelGen error.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    loc: Option<CodeLoc>,
    traceback: Vec<StackFrame>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            loc: None,
            traceback: Vec::new(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn lexical(filename: &str, pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lexical, message).with_loc(CodeLoc::new(filename, pos))
    }

    pub fn syntax(filename: &str, pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message).with_loc(CodeLoc::new(filename, pos))
    }

    #[must_use]
    pub fn with_loc(mut self, loc: CodeLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    /// Attaches a location if none was recorded closer to the failure.
    #[must_use]
    pub(crate) fn or_loc(mut self, loc: Option<CodeLoc>) -> Self {
        if self.loc.is_none() {
            self.loc = loc;
        }
        self
    }

    #[must_use]
    pub(crate) fn with_traceback(mut self, traceback: Vec<StackFrame>) -> Self {
        if self.traceback.is_empty() {
            self.traceback = traceback;
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn loc(&self) -> Option<&CodeLoc> {
        self.loc.as_ref()
    }

    pub fn traceback(&self) -> &[StackFrame] {
        &self.traceback
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.traceback.is_empty() {
            writeln!(f, "Traceback:")?;
            for (depth, frame) in self.traceback.iter().enumerate() {
                if frame.name.is_none() && frame.loc.is_none() {
                    continue;
                }
                write!(f, "{depth}:")?;
                if let Some(name) = &frame.name {
                    write!(f, " {name}")?;
                }
                if let Some(loc) = &frame.loc {
                    if frame.name.is_some() {
                        write!(f, " at")?;
                    }
                    write!(f, " {loc}")?;
                }
                writeln!(f)?;
            }
        }
        if let Some(loc) = &self.loc {
            write!(f, "{loc}: ")?;
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_and_kind() {
        let err = Error::syntax("cube.mg", Pos { offset: 4, line: 2, column: 5 }, "Unexpected token");
        assert_eq!(err.to_string(), "cube.mg:2:5: syntax error: Unexpected token");
    }

    #[test]
    fn display_prints_traceback_frames_outermost_first() {
        let err = Error::new(ErrorKind::Name, "Undefined name \"x\"")
            .with_loc(CodeLoc {
                filename: "a.mg".to_owned(),
                line: 3,
                column: 1,
            })
            .with_traceback(vec![
                StackFrame { name: None, loc: None },
                StackFrame {
                    name: Some("f".to_owned()),
                    loc: Some(CodeLoc {
                        filename: "a.mg".to_owned(),
                        line: 9,
                        column: 1,
                    }),
                },
            ]);
        let text = err.to_string();
        assert!(text.starts_with("Traceback:\n"));
        assert!(text.contains("1: f at a.mg:9:1"));
        assert!(text.ends_with("a.mg:3:1: name error: Undefined name \"x\""));
    }
}
