//! Error types for nair8
//!
//! Lexing, parsing and checking fail fast with a positioned error. Runtime errors carry
//! a type name so the language can catch them with `fail e as Type`.

use crate::token::Span;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Lexer error kinds
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unterminated interpolation in string")]
    UnterminatedInterpolation,
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("tabs are not supported for indentation")]
    TabIndentation,
    #[error("dedent to {0} spaces does not match any enclosing block")]
    InvalidDedent(usize),
    #[error("unmatched '{0}'")]
    UnmatchedDelimiter(char),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    pub fn new(kind: LexErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Parser error kinds
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("expected {expected}, found {found}")]
    ExpectedToken { expected: String, found: String },
    #[error("expected expression, found {0}")]
    ExpectedExpression(String),
    #[error("expected type, found {0}")]
    ExpectedType(String),
    #[error("{names} parameter name(s) but {types} parameter type(s)")]
    ParameterTypeCount { names: usize, types: usize },
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("'emit' is only allowed inside a Stream")]
    EmitOutsideStream,
    #[error("expected a field, constructor or method in Object body, found {0}")]
    InvalidObjectMember(String),
    #[error("in interpolation: {0}")]
    Interpolation(LexErrorKind),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// A type error found before the program runs
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct CheckError {
    pub message: String,
    pub span: Span,
}

impl CheckError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// The type of a runtime error. Every kind names an Object type that
/// inherits from `Error`, which is what `fail e as Type` matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    Type,
    Name,
    Arity,
    DivideByZero,
    StreamExhausted,
    Reentrancy,
    Index,
    Key,
    Overflow,
    StackOverflow,
    /// Raised by `raise ... as Name`
    Raised(String),
}

impl RuntimeErrorKind {
    /// Names of the built-in error types
    pub const BUILTIN: [&'static str; 10] = [
        "TypeError",
        "NameError",
        "ArityError",
        "DivideByZeroError",
        "StreamExhaustedError",
        "ReentrancyError",
        "IndexError",
        "KeyError",
        "OverflowError",
        "StackOverflowError",
    ];

    pub fn type_name(&self) -> &str {
        match self {
            RuntimeErrorKind::Type => "TypeError",
            RuntimeErrorKind::Name => "NameError",
            RuntimeErrorKind::Arity => "ArityError",
            RuntimeErrorKind::DivideByZero => "DivideByZeroError",
            RuntimeErrorKind::StreamExhausted => "StreamExhaustedError",
            RuntimeErrorKind::Reentrancy => "ReentrancyError",
            RuntimeErrorKind::Index => "IndexError",
            RuntimeErrorKind::Key => "KeyError",
            RuntimeErrorKind::Overflow => "OverflowError",
            RuntimeErrorKind::StackOverflow => "StackOverflowError",
            RuntimeErrorKind::Raised(name) => name,
        }
    }

    /// Resolve a type name used in `raise ... as Name`
    pub fn from_name(name: &str) -> Self {
        match name {
            "TypeError" => RuntimeErrorKind::Type,
            "NameError" => RuntimeErrorKind::Name,
            "ArityError" => RuntimeErrorKind::Arity,
            "DivideByZeroError" => RuntimeErrorKind::DivideByZero,
            "StreamExhaustedError" => RuntimeErrorKind::StreamExhausted,
            "ReentrancyError" => RuntimeErrorKind::Reentrancy,
            "IndexError" => RuntimeErrorKind::Index,
            "KeyError" => RuntimeErrorKind::Key,
            "OverflowError" => RuntimeErrorKind::Overflow,
            "StackOverflowError" => RuntimeErrorKind::StackOverflow,
            other => RuntimeErrorKind::Raised(other.to_string()),
        }
    }
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// An error raised while evaluating a program
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    /// The value given to `raise`; the message as Text for built-in errors
    pub payload: Value,
    pub span: Option<Span>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            payload: Value::text(&message),
            message,
            span: None,
        }
    }

    /// Error produced by `raise payload as type_name`
    pub fn raised(type_name: &str, payload: Value) -> Self {
        Self {
            kind: RuntimeErrorKind::from_name(type_name),
            message: payload.to_string(),
            payload,
            span: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Type, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new(RuntimeErrorKind::Name, format!("'{}' is not defined", name))
    }

    pub fn arity(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            RuntimeErrorKind::Arity,
            format!("{} expects {} argument(s), got {}", name, expected, got),
        )
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    /// Attach a position unless one is already known
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Any error the front end or the evaluator can report
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("LexError: {0}")]
    Lex(#[from] LexError),
    #[error("ParseError: {0}")]
    Parse(#[from] ParseError),
    #[error("TypeError: {0}")]
    Check(#[from] CheckError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Lex(e) => Some(e.span),
            Error::Parse(e) => Some(e.span),
            Error::Check(e) => Some(e.span),
            Error::Runtime(e) => e.span,
        }
    }

    /// Pair the error with the offending source line for display
    pub fn with_source(self, source: &str) -> Diagnostic {
        let source_line = self.span().and_then(|span| {
            if span.line == 0 {
                return None;
            }
            source.lines().nth(span.line - 1).map(str::to_string)
        });
        Diagnostic {
            error: self,
            source_line,
        }
    }
}

/// An error ready to be shown to a user
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub error: Error,
    pub source_line: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = self.error.span() {
            write!(f, "[line {}:{}] {}", span.line, span.column, self.error)?;

            if let Some(ref line) = self.source_line {
                write!(f, "\n  | {}", line)?;
                write!(f, "\n  | {}^", " ".repeat(span.column.saturating_sub(1)))?;
            }
        } else {
            write!(f, "{}", self.error)?;
        }
        Ok(())
    }
}

/// Result type for the front end and the convenience entry points
pub type Result<T> = std::result::Result<T, Error>;
