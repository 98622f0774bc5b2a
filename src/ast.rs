//! Abstract Syntax Tree definitions for nair8
//!
//! Represents the structure of programs after parsing. Statement lists are
//! shared (`Block`) so that functions and suspended streams can keep
//! executing a body after the parser is gone.

use std::rc::Rc;

use crate::token::Span;
use crate::types::Type;

/// An immutable, shareable list of statements
pub type Block = Rc<[Stmt]>;

/// Expression nodes
#[derive(Debug, Clone)]
pub enum Expr {
    /// Whole literal: 42
    Whole { value: i64, span: Span },

    /// Decimal literal: 3.14
    Decimal { value: f64, span: Span },

    /// Text literal: "hello"
    Text { value: String, span: Span },

    /// Interpolated text: "Hi {name}"
    Template { parts: Vec<TemplatePart>, span: Span },

    /// Truth literal: true, false
    Truth { value: bool, span: Span },

    /// The void literal
    Void { span: Span },

    /// Variable reference: count
    Ident { name: String, span: Span },

    /// The current receiver inside a method or constructor
    My { span: Span },

    /// Binary operation: a + b, x == y
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
        span: Span,
    },

    /// Short-circuit logic: a and b, x or y
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
        span: Span,
    },

    /// Unary operation: -x, not y
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },

    /// Call: add using 2, 3 / add(2, 3)
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },

    /// Member access: p.name, my name
    Member {
        object: Box<Expr>,
        name: String,
        span: Span,
    },

    /// Element access: xs[0], table["key"]
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },

    /// List literal: [1, 2, 3]
    List { items: Vec<Expr>, span: Span },

    /// Mapping literal: {"a": 1}
    Mapping { entries: Vec<(Expr, Expr)>, span: Span },

    /// Construction: new Person using "Ada"
    New {
        type_name: String,
        args: Vec<Expr>,
        span: Span,
    },

    /// Await a promise: await fetch using 1
    Await { operand: Box<Expr>, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Whole { span, .. }
            | Expr::Decimal { span, .. }
            | Expr::Text { span, .. }
            | Expr::Template { span, .. }
            | Expr::Truth { span, .. }
            | Expr::Void { span }
            | Expr::Ident { span, .. }
            | Expr::My { span }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::List { span, .. }
            | Expr::Mapping { span, .. }
            | Expr::New { span, .. }
            | Expr::Await { span, .. } => *span,
        }
    }

    /// Whether evaluating this expression can reach an `await`
    pub fn awaits(&self) -> bool {
        match self {
            Expr::Await { .. } => true,
            Expr::Template { parts, .. } => parts.iter().any(|part| match part {
                TemplatePart::Expr(expr) => expr.awaits(),
                TemplatePart::Literal(_) => false,
            }),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                left.awaits() || right.awaits()
            }
            Expr::Unary { operand, .. } => operand.awaits(),
            Expr::Call { callee, args, .. } => callee.awaits() || args.iter().any(Expr::awaits),
            Expr::Member { object, .. } => object.awaits(),
            Expr::Index { object, index, .. } => object.awaits() || index.awaits(),
            Expr::List { items, .. } | Expr::New { args: items, .. } => items.iter().any(Expr::awaits),
            Expr::Mapping { entries, .. } => entries.iter().any(|(k, v)| k.awaits() || v.awaits()),
            _ => false,
        }
    }
}

/// One part of an interpolated string
#[derive(Debug, Clone)]
pub enum TemplatePart {
    Literal(String),
    Expr(Expr),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,      // +
    Sub,      // -
    Mul,      // *
    Div,      // /
    Mod,      // %
    Eq,       // ==
    Ne,       // !=
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Mod => write!(f, "%"),
            BinaryOp::Eq => write!(f, "=="),
            BinaryOp::Ne => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::Le => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::Ge => write!(f, ">="),
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,  // -
    Not,  // not
}

/// Logical operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

/// What calling a function produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Runs to completion and produces its output value
    Job,
    /// Runs until its first `await`, then continues on the scheduler;
    /// the call produces a Promise
    Task,
    /// Generator; the call produces a Stream
    Stream,
}

impl std::fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionKind::Job => write!(f, "Job"),
            FunctionKind::Task => write!(f, "Task"),
            FunctionKind::Stream => write!(f, "Stream"),
        }
    }
}

/// A declared parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    /// Only constructors declared with `build defaults` carry defaults
    pub default: Option<Expr>,
}

/// `Job`, `Task` and `Stream` declarations, including methods
#[derive(Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<Param>,
    /// Declared output type; for a Stream, the type of emitted values
    pub returns: Option<Type>,
    pub body: Block,
    pub span: Span,
}

/// `build` constructor of an Object
#[derive(Debug)]
pub struct Constructor {
    pub params: Vec<Param>,
    /// Declared with `build defaults`
    pub defaults: bool,
    pub body: Block,
    pub span: Span,
}

/// A field declared in an Object body
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
    pub span: Span,
}

/// `Object Name inherits Parent:` declaration
#[derive(Debug)]
pub struct ObjectDecl {
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<FieldDecl>,
    pub constructors: Vec<Rc<Constructor>>,
    pub methods: Vec<Rc<FunctionDecl>>,
    pub span: Span,
}

/// One `fail name as Type:` clause
#[derive(Debug)]
pub struct Handler {
    pub name: String,
    pub error_type: String,
    pub body: Block,
    pub span: Span,
}

/// `do: ... fail e as T: ... always: ...`
#[derive(Debug)]
pub struct TryStmt {
    pub body: Block,
    pub handlers: Vec<Handler>,
    pub always: Option<Block>,
    pub span: Span,
}

/// `loop while cond:`
#[derive(Debug)]
pub struct LoopStmt {
    pub condition: Expr,
    pub body: Block,
    pub span: Span,
}

/// `loop each item in items:`
#[derive(Debug)]
pub struct EachStmt {
    pub variable: String,
    pub iterable: Expr,
    pub body: Block,
    pub span: Span,
}

/// Pattern of a `match` arm
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches on the runtime variant (or Object ancestry)
    Type(Type),
    /// Matches by equality with the evaluated expression
    Value(Expr),
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Block,
    pub span: Span,
}

/// Statement nodes
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Expression statement
    Expr { expr: Expr },

    /// Declaration: name as Type is expr
    VarDecl {
        name: String,
        ty: Type,
        value: Option<Expr>,
        span: Span,
    },

    /// Assignment: target is expr
    Assign {
        target: Expr,
        value: Expr,
        span: Span,
    },

    /// show expr
    Show { value: Expr, span: Span },

    /// output expr
    Output { value: Option<Expr>, span: Span },

    /// emit expr
    Emit { value: Expr, span: Span },

    /// raise expr as ErrorType
    Raise {
        payload: Expr,
        error_type: String,
        span: Span,
    },

    /// when cond: ... or when cond: ... or: ...
    When {
        branches: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
        span: Span,
    },

    /// loop while cond: ...
    Loop(Rc<LoopStmt>),

    /// loop each x in xs: ...
    Each(Rc<EachStmt>),

    /// match subject: when Pattern: ... or: ...
    Match {
        subject: Expr,
        arms: Vec<MatchArm>,
        otherwise: Option<Block>,
        span: Span,
    },

    /// do / fail / always
    Try(Rc<TryStmt>),

    /// Job, Task or Stream declaration
    Function(Rc<FunctionDecl>),

    /// Object declaration
    Object(Rc<ObjectDecl>),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr { expr } => expr.span(),
            Stmt::VarDecl { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Show { span, .. }
            | Stmt::Output { span, .. }
            | Stmt::Emit { span, .. }
            | Stmt::Raise { span, .. }
            | Stmt::When { span, .. }
            | Stmt::Match { span, .. } => *span,
            Stmt::Loop(stmt) => stmt.span,
            Stmt::Each(stmt) => stmt.span,
            Stmt::Try(stmt) => stmt.span,
            Stmt::Function(decl) => decl.span,
            Stmt::Object(decl) => decl.span,
        }
    }

    /// Whether the statement's own expressions contain an `await`.
    /// Nested blocks are not inspected; their statements are checked when
    /// they run.
    pub fn awaits(&self) -> bool {
        match self {
            Stmt::Expr { expr } => expr.awaits(),
            Stmt::VarDecl { value, .. } => value.as_ref().is_some_and(Expr::awaits),
            Stmt::Assign { target, value, .. } => target.awaits() || value.awaits(),
            Stmt::Show { value, .. } | Stmt::Emit { value, .. } => value.awaits(),
            Stmt::Output { value, .. } => value.as_ref().is_some_and(Expr::awaits),
            Stmt::Raise { payload, .. } => payload.awaits(),
            Stmt::When { branches, .. } => branches.iter().any(|(condition, _)| condition.awaits()),
            Stmt::Loop(stmt) => stmt.condition.awaits(),
            Stmt::Each(stmt) => stmt.iterable.awaits(),
            Stmt::Match { subject, arms, .. } => {
                subject.awaits()
                    || arms.iter().any(|arm| matches!(&arm.pattern, Pattern::Value(expr) if expr.awaits()))
            }
            Stmt::Try(_) | Stmt::Function(_) | Stmt::Object(_) => false,
        }
    }
}

/// A complete program
#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Block,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements: statements.into() }
    }
}
