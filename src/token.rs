//! Token definitions for nair8
//!
//! Tokens represent the atomic units of meaning in source code.

use std::fmt;

/// Location in source code for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self { start, end, line, column }
    }

    /// Span covering `self` through `other`, positioned at `self`
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end.max(self.end), self.line, self.column)
    }
}

/// One piece of an interpolated string literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePiece {
    Literal(String),
    /// Source of an embedded `{expr}` together with where it starts
    Code { source: String, span: Span },
}

/// Token types in nair8
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Whole(i64),
    Decimal(f64),
    Text(String),
    Template(Vec<TemplatePiece>),
    True,
    False,
    Void,

    // Identifiers (type names and contextual words included)
    Ident(String),

    // Keywords
    As,
    Is,
    When,
    Or,
    And,
    Not,
    Requires,
    Returning, // returning | returns
    Job,
    Task,
    Stream,
    Object,
    Inherits,
    Build,
    My,
    New,
    Using,
    Do,
    Fail,
    Always,
    Raise,
    Match,
    Emit,
    Await, // await | awaiting
    Loop,
    While,
    Show,
    Output,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Dot,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Whole(n) => write!(f, "{}", n),
            TokenKind::Decimal(n) => write!(f, "{}", n),
            TokenKind::Text(s) => write!(f, "\"{}\"", s),
            TokenKind::Template(_) => write!(f, "interpolated text"),
            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Void => write!(f, "void"),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::As => write!(f, "as"),
            TokenKind::Is => write!(f, "is"),
            TokenKind::When => write!(f, "when"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::And => write!(f, "and"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Requires => write!(f, "requires"),
            TokenKind::Returning => write!(f, "returning"),
            TokenKind::Job => write!(f, "Job"),
            TokenKind::Task => write!(f, "Task"),
            TokenKind::Stream => write!(f, "Stream"),
            TokenKind::Object => write!(f, "Object"),
            TokenKind::Inherits => write!(f, "inherits"),
            TokenKind::Build => write!(f, "build"),
            TokenKind::My => write!(f, "my"),
            TokenKind::New => write!(f, "new"),
            TokenKind::Using => write!(f, "using"),
            TokenKind::Do => write!(f, "do"),
            TokenKind::Fail => write!(f, "fail"),
            TokenKind::Always => write!(f, "always"),
            TokenKind::Raise => write!(f, "raise"),
            TokenKind::Match => write!(f, "match"),
            TokenKind::Emit => write!(f, "emit"),
            TokenKind::Await => write!(f, "await"),
            TokenKind::Loop => write!(f, "loop"),
            TokenKind::While => write!(f, "while"),
            TokenKind::Show => write!(f, "show"),
            TokenKind::Output => write!(f, "output"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::EqualEqual => write!(f, "=="),
            TokenKind::BangEqual => write!(f, "!="),
            TokenKind::Less => write!(f, "<"),
            TokenKind::LessEqual => write!(f, "<="),
            TokenKind::Greater => write!(f, ">"),
            TokenKind::GreaterEqual => write!(f, ">="),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Indent => write!(f, "indent"),
            TokenKind::Dedent => write!(f, "dedent"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its kind and location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub lexeme: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: String) -> Self {
        Self { kind, span, lexeme }
    }
}

/// Check if a string is a keyword and return the corresponding token kind
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    match ident {
        "as" => Some(TokenKind::As),
        "is" => Some(TokenKind::Is),
        "when" => Some(TokenKind::When),
        "or" => Some(TokenKind::Or),
        "and" => Some(TokenKind::And),
        "not" => Some(TokenKind::Not),
        "requires" => Some(TokenKind::Requires),
        "returning" | "returns" => Some(TokenKind::Returning),
        "Job" => Some(TokenKind::Job),
        "Task" => Some(TokenKind::Task),
        "Stream" => Some(TokenKind::Stream),
        "Object" => Some(TokenKind::Object),
        "inherits" => Some(TokenKind::Inherits),
        "build" => Some(TokenKind::Build),
        "my" => Some(TokenKind::My),
        "new" => Some(TokenKind::New),
        "using" => Some(TokenKind::Using),
        "do" => Some(TokenKind::Do),
        "fail" => Some(TokenKind::Fail),
        "always" => Some(TokenKind::Always),
        "raise" => Some(TokenKind::Raise),
        "match" => Some(TokenKind::Match),
        "emit" => Some(TokenKind::Emit),
        "await" | "awaiting" => Some(TokenKind::Await),
        "loop" => Some(TokenKind::Loop),
        "while" => Some(TokenKind::While),
        "show" => Some(TokenKind::Show),
        "output" => Some(TokenKind::Output),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        "void" => Some(TokenKind::Void),
        _ => None,
    }
}
