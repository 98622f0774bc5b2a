//! Parser for nair8
//!
//! Converts tokens into an Abstract Syntax Tree. Recursive descent with no
//! error recovery: the first problem aborts with a positioned `ParseError`.

use std::rc::Rc;

use crate::ast::{
    BinaryOp, Block, Constructor, EachStmt, Expr, FieldDecl, FunctionDecl, FunctionKind, Handler,
    LogicalOp, LoopStmt, MatchArm, ObjectDecl, Param, Pattern, Program, Stmt, TemplatePart,
    TryStmt, UnaryOp,
};
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::Lexer;
use crate::token::{TemplatePiece, Token, TokenKind};
use crate::types::Type;

type Result<T> = std::result::Result<T, ParseError>;

/// The parser state
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Kinds of the function bodies being parsed, innermost last
    functions: Vec<FunctionKind>,
}

impl Parser {
    /// Create a new parser from tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            functions: Vec::new(),
        }
    }

    /// Parse the tokens into a program
    pub fn parse(&mut self) -> Result<Program> {
        let mut statements = Vec::new();

        self.skip_newlines();
        while !self.is_at_end() {
            statements.push(self.statement()?);
            self.skip_newlines();
        }

        Ok(Program::new(statements))
    }

    /// Parse a single expression that must consume every token
    pub fn parse_expression(&mut self) -> Result<Expr> {
        let expr = self.expression()?;
        self.skip_newlines();
        if !self.is_at_end() {
            return Err(self.error_expected("end of expression"));
        }
        Ok(expr)
    }

    // ==================== Statements ====================

    fn statement(&mut self) -> Result<Stmt> {
        match &self.peek().kind {
            TokenKind::Job => self.function_declaration(FunctionKind::Job),
            TokenKind::Task => self.function_declaration(FunctionKind::Task),
            TokenKind::Stream => self.function_declaration(FunctionKind::Stream),
            TokenKind::Object => self.object_declaration(),
            TokenKind::When => self.when_statement(),
            TokenKind::Loop => self.loop_statement(),
            TokenKind::Do => self.try_statement(),
            TokenKind::Match => self.match_statement(),
            _ => {
                let stmt = self.simple_statement()?;
                self.end_statement()?;
                Ok(stmt)
            }
        }
    }

    fn simple_statement(&mut self) -> Result<Stmt> {
        match &self.peek().kind {
            TokenKind::Show => {
                let span = self.advance().span;
                let value = self.expression()?;
                Ok(Stmt::Show { value, span })
            }
            TokenKind::Output => {
                let span = self.advance().span;
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.expression()?)
                };
                Ok(Stmt::Output { value, span })
            }
            TokenKind::Emit => {
                let span = self.advance().span;
                if self.functions.last() != Some(&FunctionKind::Stream) {
                    return Err(ParseError::new(ParseErrorKind::EmitOutsideStream, span));
                }
                let value = self.expression()?;
                Ok(Stmt::Emit { value, span })
            }
            TokenKind::Raise => {
                let span = self.advance().span;
                let payload = self.expression()?;
                self.expect(&TokenKind::As, "'as' after raised value")?;
                let error_type = self.expect_ident("error type name")?;
                Ok(Stmt::Raise { payload, error_type, span })
            }
            TokenKind::Ident(_) if self.peek_next_is(&TokenKind::As) => self.var_declaration(),
            _ => self.expression_or_assignment(),
        }
    }

    fn var_declaration(&mut self) -> Result<Stmt> {
        let field = self.typed_binding()?;
        Ok(Stmt::VarDecl {
            name: field.name,
            ty: field.ty,
            value: field.init,
            span: field.span,
        })
    }

    /// name as Type [is expr], shared by variables and Object fields
    fn typed_binding(&mut self) -> Result<FieldDecl> {
        let span = self.peek().span;
        let name = self.expect_ident("variable name")?;
        self.expect(&TokenKind::As, "'as'")?;
        let ty = self.parse_type()?;
        let init = if self.match_token(&TokenKind::Is) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(FieldDecl { name, ty, init, span })
    }

    fn expression_or_assignment(&mut self) -> Result<Stmt> {
        let expr = self.expression()?;

        if self.match_token(&TokenKind::Is) {
            let span = expr.span();
            let value = self.expression()?;
            return match expr {
                Expr::Ident { .. } | Expr::Member { .. } | Expr::Index { .. } => {
                    Ok(Stmt::Assign { target: expr, value, span })
                }
                _ => Err(ParseError::new(ParseErrorKind::InvalidAssignmentTarget, span)),
            };
        }

        Ok(Stmt::Expr { expr })
    }

    fn function_declaration(&mut self, kind: FunctionKind) -> Result<Stmt> {
        Ok(Stmt::Function(Rc::new(self.function_decl(kind)?)))
    }

    /// Job|Task|Stream name [requires params] [returning T]: block
    fn function_decl(&mut self, kind: FunctionKind) -> Result<FunctionDecl> {
        let span = self.advance().span;
        let name = self.expect_ident("function name")?;

        let params = if self.match_token(&TokenKind::Requires) {
            self.parameters()?
        } else {
            Vec::new()
        };

        let mut returns = if self.match_token(&TokenKind::Returning)
            || (kind == FunctionKind::Stream
                && (self.match_word("emitting") || self.match_word("emits")))
        {
            Some(self.parse_type()?)
        } else {
            None
        };

        // A Task's declared result may be spelled as the promise itself
        if kind == FunctionKind::Task {
            returns = returns.map(|ty| match ty {
                Type::Promise(inner) => *inner,
                other => other,
            });
        }

        let body = self.function_body(kind)?;

        Ok(FunctionDecl { name, kind, params, returns, body, span })
    }

    fn function_body(&mut self, kind: FunctionKind) -> Result<Block> {
        self.functions.push(kind);
        let body = self.block();
        self.functions.pop();
        body
    }

    /// Parameter groups: `a as Whole, b as Text` or `a, b as Whole, Text`
    fn parameters(&mut self) -> Result<Vec<Param>> {
        let mut params = Vec::new();

        loop {
            let group_span = self.peek().span;
            let mut names = vec![self.expect_ident("parameter name")?];
            while self.check(&TokenKind::Comma)
                && matches!(self.peek_next().map(|t| &t.kind), Some(TokenKind::Ident(_)))
            {
                self.advance();
                names.push(self.expect_ident("parameter name")?);
            }

            if self.match_token(&TokenKind::As) {
                let mut types = vec![self.parse_type()?];
                // `, c as T` after a type starts the next group
                while types.len() < names.len()
                    && self.check(&TokenKind::Comma)
                    && !self.starts_typed_group(self.current + 1)
                {
                    self.advance();
                    types.push(self.parse_type()?);
                }
                if types.len() != names.len() {
                    return Err(ParseError::new(
                        ParseErrorKind::ParameterTypeCount {
                            names: names.len(),
                            types: types.len(),
                        },
                        group_span,
                    ));
                }
                params.extend(names.into_iter().zip(types).map(|(name, ty)| Param {
                    name,
                    ty,
                    default: None,
                }));
            } else {
                params.extend(names.into_iter().map(|name| Param {
                    name,
                    ty: Type::Any,
                    default: None,
                }));
            }

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    /// build defaults a is 1, b as Text is "x"
    fn default_parameters(&mut self) -> Result<Vec<Param>> {
        let mut params = Vec::new();

        loop {
            let name = self.expect_ident("parameter name")?;
            let ty = if self.match_token(&TokenKind::As) {
                self.parse_type()?
            } else {
                Type::Any
            };
            self.expect(&TokenKind::Is, "'is' and a default value")?;
            let default = self.expression()?;
            params.push(Param { name, ty, default: Some(default) });

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(params)
    }

    /// Object Name [inherits Parent][: members]
    fn object_declaration(&mut self) -> Result<Stmt> {
        let span = self.advance().span;
        let name = self.expect_ident("Object name")?;
        let parent = if self.match_token(&TokenKind::Inherits) {
            Some(self.expect_ident("parent Object name")?)
        } else {
            None
        };

        let mut decl = ObjectDecl {
            name,
            parent,
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            span,
        };

        if self.match_token(&TokenKind::Colon) {
            self.expect(&TokenKind::Newline, "end of line after ':'")?;
            self.expect(&TokenKind::Indent, "an indented Object body")?;
            while !self.check(&TokenKind::Dedent) && !self.is_at_end() {
                self.object_member(&mut decl)?;
                self.skip_newlines();
            }
            self.expect(&TokenKind::Dedent, "end of Object body")?;
        } else {
            self.end_statement()?;
        }

        Ok(Stmt::Object(Rc::new(decl)))
    }

    fn object_member(&mut self, decl: &mut ObjectDecl) -> Result<()> {
        match &self.peek().kind {
            TokenKind::Job => decl.methods.push(Rc::new(self.function_decl(FunctionKind::Job)?)),
            TokenKind::Task => decl.methods.push(Rc::new(self.function_decl(FunctionKind::Task)?)),
            TokenKind::Stream => {
                decl.methods.push(Rc::new(self.function_decl(FunctionKind::Stream)?))
            }
            TokenKind::Build => decl.constructors.push(Rc::new(self.constructor()?)),
            TokenKind::Ident(_) if self.peek_next_is(&TokenKind::As) => {
                let field = self.typed_binding()?;
                self.end_statement()?;
                decl.fields.push(field);
            }
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidObjectMember(other.to_string()),
                    self.peek().span,
                ));
            }
        }
        Ok(())
    }

    /// build [requires params | defaults params]: block
    fn constructor(&mut self) -> Result<Constructor> {
        let span = self.advance().span;

        let (params, defaults) = if self.match_word("defaults") {
            (self.default_parameters()?, true)
        } else if self.match_token(&TokenKind::Requires) {
            (self.parameters()?, false)
        } else {
            (Vec::new(), false)
        };

        let body = self.function_body(FunctionKind::Job)?;

        Ok(Constructor { params, defaults, body, span })
    }

    /// when cond: ... (or when cond: ...)* (or: ...)?
    fn when_statement(&mut self) -> Result<Stmt> {
        let span = self.advance().span;

        let mut branches = Vec::new();
        let condition = self.expression()?;
        branches.push((condition, self.block()?));

        let mut otherwise = None;
        while self.check(&TokenKind::Or) {
            if self.peek_next_is(&TokenKind::When) {
                self.advance();
                self.advance();
                let condition = self.expression()?;
                branches.push((condition, self.block()?));
            } else if self.peek_next_is(&TokenKind::Colon) {
                self.advance();
                otherwise = Some(self.block()?);
                break;
            } else {
                break;
            }
        }

        Ok(Stmt::When { branches, otherwise, span })
    }

    /// loop while cond: ... / loop each x in xs: ...
    fn loop_statement(&mut self) -> Result<Stmt> {
        let span = self.advance().span;

        if self.match_token(&TokenKind::While) {
            let condition = self.expression()?;
            let body = self.block()?;
            return Ok(Stmt::Loop(Rc::new(LoopStmt { condition, body, span })));
        }

        if self.match_word("each") {
            let variable = self.expect_ident("loop variable name")?;
            if !self.match_word("in") {
                return Err(self.error_expected("'in'"));
            }
            let iterable = self.expression()?;
            let body = self.block()?;
            return Ok(Stmt::Each(Rc::new(EachStmt { variable, iterable, body, span })));
        }

        Err(self.error_expected("'while' or 'each' after 'loop'"))
    }

    /// do: ... (fail e as T: ...)* (always: ...)?
    fn try_statement(&mut self) -> Result<Stmt> {
        let span = self.advance().span;
        let body = self.block()?;

        let mut handlers = Vec::new();
        while self.check(&TokenKind::Fail) {
            let handler_span = self.advance().span;
            let name = self.expect_ident("error variable name")?;
            self.expect(&TokenKind::As, "'as' and an error type")?;
            let error_type = self.expect_ident("error type name")?;
            let body = self.block()?;
            handlers.push(Handler { name, error_type, body, span: handler_span });
        }

        let always = if self.match_token(&TokenKind::Always) {
            Some(self.block()?)
        } else {
            None
        };

        Ok(Stmt::Try(Rc::new(TryStmt { body, handlers, always, span })))
    }

    /// match subject: (when Pattern: ...)* (or: ...)?
    fn match_statement(&mut self) -> Result<Stmt> {
        let span = self.advance().span;
        let subject = self.expression()?;
        self.expect(&TokenKind::Colon, "':' after match subject")?;
        self.expect(&TokenKind::Newline, "end of line after ':'")?;
        self.expect(&TokenKind::Indent, "indented match arms")?;

        let mut arms = Vec::new();
        let mut otherwise = None;

        loop {
            self.skip_newlines();
            if self.check(&TokenKind::Dedent) || self.is_at_end() {
                break;
            }
            if self.check(&TokenKind::When) {
                let arm_span = self.advance().span;
                let pattern = self.pattern()?;
                let body = self.block()?;
                arms.push(MatchArm { pattern, body, span: arm_span });
            } else if self.match_token(&TokenKind::Or) {
                otherwise = Some(self.block()?);
            } else {
                return Err(self.error_expected("'when' or 'or' in match"));
            }
        }

        self.expect(&TokenKind::Dedent, "end of match")?;

        Ok(Stmt::Match { subject, arms, otherwise, span })
    }

    fn pattern(&mut self) -> Result<Pattern> {
        let is_type = match &self.peek().kind {
            TokenKind::Ident(name) => name.starts_with(|c: char| c.is_uppercase()),
            TokenKind::Stream | TokenKind::Job => true,
            _ => false,
        };

        if is_type {
            Ok(Pattern::Type(self.parse_type()?))
        } else {
            Ok(Pattern::Value(self.expression()?))
        }
    }

    /// `:` then either an indented block or a single statement on the same line
    fn block(&mut self) -> Result<Block> {
        self.expect(&TokenKind::Colon, "':'")?;

        if !self.match_token(&TokenKind::Newline) {
            return Ok(vec![self.statement()?].into());
        }

        self.expect(&TokenKind::Indent, "an indented block")?;

        let mut stmts = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.is_at_end() {
            stmts.push(self.statement()?);
            self.skip_newlines();
        }

        self.expect(&TokenKind::Dedent, "end of block")?;

        Ok(stmts.into())
    }

    fn end_statement(&mut self) -> Result<()> {
        if self.match_token(&TokenKind::Newline) || self.at_statement_end() {
            Ok(())
        } else {
            Err(self.error_expected("end of line"))
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
        )
    }

    // ==================== Types ====================

    fn parse_type(&mut self) -> Result<Type> {
        let name = match &self.peek().kind {
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Stream => "Stream".to_string(),
            TokenKind::Job => "Job".to_string(),
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::ExpectedType(other.to_string()),
                    self.peek().span,
                ));
            }
        };
        self.advance();

        let ty = match name.as_str() {
            "List" => Type::List(Box::new(self.type_argument()?)),
            "Promise" => Type::Promise(Box::new(self.type_argument()?)),
            "Stream" => Type::Stream(Box::new(self.type_argument()?)),
            "Mapping" => {
                if self.match_token(&TokenKind::LeftBracket) {
                    let key = self.parse_type()?;
                    self.expect(&TokenKind::Comma, "',' between Mapping key and value types")?;
                    let value = self.parse_type()?;
                    self.expect(&TokenKind::RightBracket, "']'")?;
                    Type::Mapping(Box::new(key), Box::new(value))
                } else if self.match_word("of") {
                    let key = self.parse_type()?;
                    if !self.match_word("to") {
                        return Err(self.error_expected("'to' and a Mapping value type"));
                    }
                    let value = self.parse_type()?;
                    Type::Mapping(Box::new(key), Box::new(value))
                } else {
                    Type::from_name("Mapping")
                }
            }
            other => Type::from_name(other),
        };

        Ok(ty)
    }

    /// `[T]` or `of T` after a generic name; `Any` when absent
    fn type_argument(&mut self) -> Result<Type> {
        if self.match_token(&TokenKind::LeftBracket) {
            let ty = self.parse_type()?;
            self.expect(&TokenKind::RightBracket, "']'")?;
            Ok(ty)
        } else if self.match_word("of") {
            self.parse_type()
        } else {
            Ok(Type::Any)
        }
    }

    // ==================== Expressions ====================

    fn expression(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;

        // `or when` and `or:` belong to the enclosing statement
        while self.check(&TokenKind::Or)
            && !self.peek_next_is(&TokenKind::When)
            && !self.peek_next_is(&TokenKind::Colon)
        {
            self.advance();
            let right = self.and_expr()?;
            let span = left.span().to(right.span());
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::Or,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;

        while self.match_token(&TokenKind::And) {
            let right = self.not_expr()?;
            let span = left.span().to(right.span());
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::And,
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.match_token(&TokenKind::Not) {
            let span = self.previous().span;
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            });
        }

        self.equality()
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;

        loop {
            let op = if self.match_token(&TokenKind::EqualEqual) {
                BinaryOp::Eq
            } else if self.match_token(&TokenKind::BangEqual) {
                BinaryOp::Ne
            } else {
                break;
            };

            let right = self.comparison()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.term()?;

        loop {
            let op = if self.match_token(&TokenKind::Less) {
                BinaryOp::Lt
            } else if self.match_token(&TokenKind::LessEqual) {
                BinaryOp::Le
            } else if self.match_token(&TokenKind::Greater) {
                BinaryOp::Gt
            } else if self.match_token(&TokenKind::GreaterEqual) {
                BinaryOp::Ge
            } else {
                break;
            };

            let right = self.term()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;

        loop {
            let op = if self.match_token(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.match_token(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };

            let right = self.factor()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;

        loop {
            let op = if self.match_token(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.match_token(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.match_token(&TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };

            let right = self.unary()?;
            left = binary(left, op, right);
        }

        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.match_token(&TokenKind::Minus) {
            let span = self.previous().span;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }

        if self.match_token(&TokenKind::Await) {
            let span = self.previous().span;
            let operand = self.unary()?;
            return Ok(Expr::Await {
                operand: Box::new(operand),
                span,
            });
        }

        self.call()
    }

    fn call(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(&TokenKind::LeftParen) {
                let args = self.finish_arguments(&TokenKind::RightParen, "')' after arguments")?;
                let span = expr.span().to(self.previous().span);
                expr = Expr::Call { callee: Box::new(expr), args, span };
            } else if self.match_token(&TokenKind::Dot) {
                let name = self.expect_ident("member name after '.'")?;
                let span = expr.span().to(self.previous().span);
                expr = Expr::Member { object: Box::new(expr), name, span };
            } else if self.match_token(&TokenKind::LeftBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket, "']' after index")?;
                let span = expr.span().to(self.previous().span);
                expr = Expr::Index { object: Box::new(expr), index: Box::new(index), span };
            } else if self.match_token(&TokenKind::Using) {
                let args = self.using_arguments()?;
                let span = expr.span().to(self.previous().span);
                expr = Expr::Call { callee: Box::new(expr), args, span };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Everything after `using`: one or more comma-separated expressions
    fn using_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = vec![self.expression()?];
        while self.match_token(&TokenKind::Comma) {
            args.push(self.expression()?);
        }
        Ok(args)
    }

    /// Comma-separated expressions up to `close`, allowing a trailing comma
    fn finish_arguments(&mut self, close: &TokenKind, message: &str) -> Result<Vec<Expr>> {
        let mut args = Vec::new();

        while !self.check(close) {
            args.push(self.expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(close, message)?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        let span = token.span;

        let expr = match token.kind {
            TokenKind::Whole(value) => Expr::Whole { value, span },
            TokenKind::Decimal(value) => Expr::Decimal { value, span },
            TokenKind::Text(value) => Expr::Text { value, span },
            TokenKind::Template(pieces) => Expr::Template {
                parts: self.template_parts(pieces)?,
                span,
            },
            TokenKind::True => Expr::Truth { value: true, span },
            TokenKind::False => Expr::Truth { value: false, span },
            TokenKind::Void => Expr::Void { span },
            TokenKind::Ident(name) => Expr::Ident { name, span },
            TokenKind::My => {
                self.advance();
                if let TokenKind::Ident(name) = &self.peek().kind {
                    let name = name.clone();
                    let end = self.advance().span;
                    return Ok(Expr::Member {
                        object: Box::new(Expr::My { span }),
                        name,
                        span: span.to(end),
                    });
                }
                return Ok(Expr::My { span });
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen, "')' after expression")?;
                return Ok(expr);
            }
            TokenKind::LeftBracket => {
                self.advance();
                let items = self.finish_arguments(&TokenKind::RightBracket, "']' after list items")?;
                return Ok(Expr::List { items, span: span.to(self.previous().span) });
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.check(&TokenKind::RightBrace) {
                    let key = self.expression()?;
                    self.expect(&TokenKind::Colon, "':' between key and value")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RightBrace, "'}' after mapping entries")?;
                return Ok(Expr::Mapping { entries, span: span.to(self.previous().span) });
            }
            TokenKind::New => {
                self.advance();
                let type_name = self.expect_ident("Object type after 'new'")?;
                let args = if self.match_token(&TokenKind::Using) {
                    self.using_arguments()?
                } else if self.match_token(&TokenKind::LeftParen) {
                    self.finish_arguments(&TokenKind::RightParen, "')' after arguments")?
                } else {
                    Vec::new()
                };
                return Ok(Expr::New { type_name, args, span: span.to(self.previous().span) });
            }
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::ExpectedExpression(other.to_string()),
                    span,
                ));
            }
        };

        self.advance();
        Ok(expr)
    }

    /// Lex and parse the code segments of an interpolated string
    fn template_parts(&self, pieces: Vec<TemplatePiece>) -> Result<Vec<TemplatePart>> {
        pieces
            .into_iter()
            .map(|piece| match piece {
                TemplatePiece::Literal(text) => Ok(TemplatePart::Literal(text)),
                TemplatePiece::Code { source, span } => {
                    let tokens = Lexer::embedded(&source, span)
                        .tokenize()
                        .map_err(|e| ParseError::new(ParseErrorKind::Interpolation(e.kind), e.span))?;
                    let mut parser = Parser::new(tokens);
                    parser.functions = self.functions.clone();
                    Ok(TemplatePart::Expr(parser.parse_expression()?))
                }
            })
            .collect()
    }

    // ==================== Helpers ====================

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    /// `name as` at token position `at`
    fn starts_typed_group(&self, at: usize) -> bool {
        matches!(self.tokens.get(at).map(|t| &t.kind), Some(TokenKind::Ident(_)))
            && matches!(self.tokens.get(at + 1).map(|t| &t.kind), Some(TokenKind::As))
    }

    fn peek_next_is(&self, kind: &TokenKind) -> bool {
        self.peek_next()
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume a contextual word such as `each`, `in` or `defaults`
    fn match_word(&mut self, word: &str) -> bool {
        if matches!(&self.peek().kind, TokenKind::Ident(w) if w == word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_expected(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<String> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_expected(expected))
        }
    }

    fn error_expected(&self, expected: &str) -> ParseError {
        ParseError::new(
            ParseErrorKind::ExpectedToken {
                expected: expected.to_string(),
                found: self.peek().kind.to_string(),
            },
            self.peek().span,
        )
    }

    fn skip_newlines(&mut self) {
        while self.match_token(&TokenKind::Newline) {}
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    let span = left.span().to(right.span());
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
        span,
    }
}
