//! Static checks run before a program is evaluated
//!
//! The pass only uses facts that hold on every run: the kinds of literals
//! and the declared types of bindings made earlier in the same function
//! body. Anything it rejects would fail with a TypeError on the same
//! statement if that statement ran, including statements in branches that
//! never run. Names from enclosing functions, Object fields and earlier
//! REPL inputs are unknown here and never reported.

use std::collections::HashMap;

use crate::ast::{
    BinaryOp, Block, Expr, FunctionDecl, ObjectDecl, Param, Pattern, Program, Stmt,
    TemplatePart, UnaryOp,
};
use crate::error::CheckError;
use crate::token::Span;
use crate::types::Type;

type Result<T> = std::result::Result<T, CheckError>;

/// Check a parsed program, stopping at the first problem
pub fn check(program: &Program) -> Result<()> {
    Checker::default().block(&program.statements)
}

#[derive(Default)]
struct Checker {
    /// Declared types visible in the function body being checked
    scopes: Vec<HashMap<String, Type>>,
}

impl Checker {
    fn block(&mut self, block: &Block) -> Result<()> {
        self.scopes.push(HashMap::new());
        let result = block.iter().try_for_each(|stmt| self.statement(stmt));
        self.scopes.pop();
        result
    }

    /// Check `body` with only `params` in view
    fn isolated(&mut self, params: &[Param], body: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let outer = std::mem::take(&mut self.scopes);
        self.scopes
            .push(params.iter().map(|p| (p.name.clone(), p.ty.clone())).collect());
        let result = body(self);
        self.scopes = outer;
        result
    }

    /// Check `body` with one extra binding in a scope of its own
    fn with_binding(&mut self, name: &str, ty: Type, body: &Block) -> Result<()> {
        self.scopes.push(HashMap::from([(name.to_string(), ty)]));
        let result = self.block(body);
        self.scopes.pop();
        result
    }

    fn declare(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn lookup(&self, name: &str) -> Option<Type> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name)).cloned()
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr { expr } => self.discard(expr),

            Stmt::VarDecl { name, ty, value, .. } => {
                if let Some(value) = value {
                    let found = self.expr(value)?;
                    expect(ty, found, &format!("'{}'", name), value.span())?;
                }
                self.declare(name, ty.clone());
                Ok(())
            }

            Stmt::Assign { target, value, .. } => {
                let found = self.expr(value)?;
                match target {
                    Expr::Ident { name, .. } => match self.lookup(name) {
                        Some(declared) => expect(&declared, found, &format!("'{}'", name), value.span()),
                        None => Ok(()),
                    },
                    other => self.discard(other),
                }
            }

            Stmt::Show { value, .. } | Stmt::Emit { value, .. } => self.discard(value),
            Stmt::Raise { payload, .. } => self.discard(payload),
            Stmt::Output { value, .. } => match value {
                Some(value) => self.discard(value),
                None => Ok(()),
            },

            Stmt::When { branches, otherwise, .. } => {
                for (condition, body) in branches {
                    self.discard(condition)?;
                    self.block(body)?;
                }
                match otherwise {
                    Some(body) => self.block(body),
                    None => Ok(()),
                }
            }

            Stmt::Loop(stmt) => {
                self.discard(&stmt.condition)?;
                self.block(&stmt.body)
            }

            Stmt::Each(stmt) => {
                self.discard(&stmt.iterable)?;
                self.with_binding(&stmt.variable, Type::Any, &stmt.body)
            }

            Stmt::Match { subject, arms, otherwise, .. } => {
                self.discard(subject)?;
                for arm in arms {
                    if let Pattern::Value(expr) = &arm.pattern {
                        self.discard(expr)?;
                    }
                    self.block(&arm.body)?;
                }
                match otherwise {
                    Some(body) => self.block(body),
                    None => Ok(()),
                }
            }

            Stmt::Try(stmt) => {
                self.block(&stmt.body)?;
                for handler in &stmt.handlers {
                    let ty = Type::Object(handler.error_type.clone());
                    self.with_binding(&handler.name, ty, &handler.body)?;
                }
                match &stmt.always {
                    Some(body) => self.block(body),
                    None => Ok(()),
                }
            }

            Stmt::Function(decl) => {
                self.declare(&decl.name, Type::Job);
                self.function(decl)
            }

            Stmt::Object(decl) => self.object(decl),
        }
    }

    fn function(&mut self, decl: &FunctionDecl) -> Result<()> {
        self.isolated(&decl.params, |checker| checker.block(&decl.body))
    }

    fn object(&mut self, decl: &ObjectDecl) -> Result<()> {
        for field in &decl.fields {
            if let Some(init) = &field.init {
                self.isolated(&[], |checker| {
                    let found = checker.expr(init)?;
                    let what = format!("field '{}' of {}", field.name, decl.name);
                    expect(&field.ty, found, &what, init.span())
                })?;
            }
        }

        for constructor in &decl.constructors {
            self.isolated(&constructor.params, |checker| {
                for param in &constructor.params {
                    if let Some(default) = &param.default {
                        let found = checker.expr(default)?;
                        let what = format!("parameter '{}' of {}", param.name, decl.name);
                        expect(&param.ty, found, &what, default.span())?;
                    }
                }
                checker.block(&constructor.body)
            })?;
        }

        decl.methods.iter().try_for_each(|method| self.function(method))
    }

    fn discard(&mut self, expr: &Expr) -> Result<()> {
        self.expr(expr).map(drop)
    }

    /// The type every evaluation of `expr` produces, when it is certain
    fn expr(&mut self, expr: &Expr) -> Result<Option<Type>> {
        let ty = match expr {
            Expr::Whole { .. } => Some(Type::Whole),
            Expr::Decimal { .. } => Some(Type::Decimal),
            Expr::Text { .. } => Some(Type::Text),
            Expr::Truth { .. } => Some(Type::Truth),
            Expr::Void { .. } => Some(Type::Void),

            Expr::Template { parts, .. } => {
                for part in parts {
                    if let TemplatePart::Expr(expr) = part {
                        self.discard(expr)?;
                    }
                }
                Some(Type::Text)
            }

            Expr::Ident { name, .. } => self.lookup(name).filter(is_scalar),
            Expr::My { .. } => None,

            Expr::Binary { left, op, right, span } => {
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                binary(*op, left, right, *span)?
            }

            Expr::Logical { left, right, .. } => {
                self.discard(left)?;
                self.discard(right)?;
                Some(Type::Truth)
            }

            Expr::Unary { op, operand, span } => {
                let found = self.expr(operand)?;
                match (op, found) {
                    (_, None) => None,
                    (UnaryOp::Neg, Some(ty @ (Type::Whole | Type::Decimal))) => Some(ty),
                    (UnaryOp::Not, Some(Type::Truth)) => Some(Type::Truth),
                    (UnaryOp::Neg, Some(other)) => {
                        return Err(CheckError::new(format!("cannot negate {}", other), *span));
                    }
                    (UnaryOp::Not, Some(other)) => {
                        return Err(CheckError::new(
                            format!("'not' expects Truth, got {}", other),
                            *span,
                        ));
                    }
                }
            }

            Expr::Call { callee, args, .. } => {
                self.discard(callee)?;
                args.iter().try_for_each(|arg| self.discard(arg))?;
                None
            }
            Expr::Member { object, .. } => {
                self.discard(object)?;
                None
            }
            Expr::Index { object, index, .. } => {
                self.discard(object)?;
                self.discard(index)?;
                None
            }
            Expr::List { items, .. } | Expr::New { args: items, .. } => {
                items.iter().try_for_each(|item| self.discard(item))?;
                None
            }
            Expr::Mapping { entries, .. } => {
                for (key, value) in entries {
                    self.discard(key)?;
                    self.discard(value)?;
                }
                None
            }
            Expr::Await { operand, .. } => {
                self.discard(operand)?;
                None
            }
        };
        Ok(ty)
    }
}

/// Types whose values can only ever be of that one kind
fn is_scalar(ty: &Type) -> bool {
    matches!(ty, Type::Whole | Type::Decimal | Type::Text | Type::Truth | Type::Void)
}

fn expect(declared: &Type, found: Option<Type>, what: &str, span: Span) -> Result<()> {
    match found {
        Some(found) if !declared.is_any() && *declared != found => Err(CheckError::new(
            format!("{} expects {}, got {}", what, declared, found),
            span,
        )),
        _ => Ok(()),
    }
}

fn binary(op: BinaryOp, left: Option<Type>, right: Option<Type>, span: Span) -> Result<Option<Type>> {
    let comparison = match op {
        BinaryOp::Eq | BinaryOp::Ne => return Ok(Some(Type::Truth)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => true,
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => false,
    };

    let (Some(left), Some(right)) = (left, right) else {
        return Ok(comparison.then_some(Type::Truth));
    };

    let result = match (&left, &right) {
        _ if comparison => match (&left, &right) {
            (Type::Whole | Type::Decimal, Type::Whole | Type::Decimal) | (Type::Text, Type::Text) => {
                Some(Type::Truth)
            }
            _ => None,
        },
        (Type::Whole, Type::Whole) => Some(Type::Whole),
        (Type::Whole | Type::Decimal, Type::Whole | Type::Decimal) => Some(Type::Decimal),
        (Type::Text, Type::Text) if op == BinaryOp::Add => Some(Type::Text),
        _ => None,
    };

    match result {
        Some(ty) => Ok(Some(ty)),
        None => Err(CheckError::new(
            format!("cannot apply '{}' to {} and {}", op, left, right),
            span,
        )),
    }
}
