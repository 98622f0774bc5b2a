//! Tree-walking evaluator for nair8
//!
//! Expressions are evaluated recursively. Statements are executed one at a
//! time on behalf of a [`Machine`], which owns the control flow between
//! them. Values are checked against declared types wherever they cross a
//! binding boundary.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use colored::Colorize;

use crate::ast::{
    BinaryOp, Constructor, Expr, FunctionDecl, FunctionKind, LogicalOp, Pattern, Program, Stmt,
    TemplatePart, UnaryOp,
};
use crate::config::Config;
use crate::environment::{Env, Environment};
use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::machine::{Action, EachSource, Frame, Halt, Machine, StreamStep};
use crate::objects::{select_constructor, ObjectRegistry, ObjectType, ERROR_TYPE};
use crate::scheduler::Scheduler;
use crate::types::{self, Type};
use crate::value::{
    BoundMethod, Function, ListValue, MappingValue, ObjectValue, StreamState, StreamValue, Value,
};

/// Remaining native stack below which evaluation switches to a new segment
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// The interpreter state
pub struct Interpreter {
    globals: Env,
    pub(crate) objects: ObjectRegistry,
    pub(crate) scheduler: Scheduler,
    output: Vec<String>,
    config: Config,
    /// Nested calls currently running
    pub(crate) depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Interpreter {
    pub fn new(config: Config) -> Self {
        Self {
            globals: Rc::new(RefCell::new(Environment::new())),
            objects: ObjectRegistry::with_builtins(),
            scheduler: Scheduler::new(),
            output: Vec::new(),
            config,
            depth: 0,
        }
    }

    /// Run a program against the global scope. Globals persist between
    /// calls, so a REPL can feed one program at a time.
    pub fn interpret(&mut self, program: &Program) -> RuntimeResult<()> {
        let mut machine = Machine::new(Rc::clone(&program.statements), Rc::clone(&self.globals));
        if let Err(error) = self.run_machine(&mut machine) {
            self.trace(format_args!("uncaught {}", error));
            return Err(error);
        }

        if self.config.drain_tasks && !self.scheduler.is_empty() {
            self.trace(format_args!("draining {} parked task(s)", self.scheduler.len()));
            self.drain_tasks();
        }
        Ok(())
    }

    /// Lines produced by `show` since the last call
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Current value of a global binding
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).ok()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn trace(&self, args: fmt::Arguments<'_>) {
        if self.config.trace {
            eprintln!("{} {}", "trace:".dimmed(), args);
        }
    }

    // ==================== Statements ====================

    pub(crate) fn execute(&mut self, stmt: &Stmt, env: &Env) -> RuntimeResult<Action> {
        match stmt {
            Stmt::Expr { expr } => {
                self.evaluate(expr, env)?;
            }

            Stmt::VarDecl { name, ty, value, .. } => {
                let value = match value {
                    Some(expr) => {
                        let value = self.evaluate(expr, env)?;
                        types::expect_type(ty, &value, &format!("'{}'", name), &self.objects)?;
                        types::adopt_tags(ty, &value);
                        value
                    }
                    None => ty.default_value(),
                };
                env.borrow_mut().define(name.clone(), value, ty.clone());
            }

            Stmt::Assign { target, value, .. } => {
                let value = self.evaluate(value, env)?;
                self.assign(target, value, env)?;
            }

            Stmt::Show { value, .. } => {
                let value = self.evaluate(value, env)?;
                self.output.push(value.to_string());
            }

            Stmt::Output { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Void,
                };
                return Ok(Action::Output(value));
            }

            Stmt::Emit { value, .. } => {
                return Ok(Action::Emit(self.evaluate(value, env)?));
            }

            Stmt::Raise { payload, error_type, .. } => {
                let payload = self.evaluate(payload, env)?;
                if !self.objects.contains(error_type) {
                    self.objects.declare_plain(error_type, Some(ERROR_TYPE));
                }
                return Err(RuntimeError::raised(error_type, payload));
            }

            Stmt::When { branches, otherwise, .. } => {
                for (condition, body) in branches {
                    if self.condition(condition, env)? {
                        let scope = Environment::child(env);
                        return Ok(Action::Enter(Frame::block(Rc::clone(body), scope)));
                    }
                }
                if let Some(body) = otherwise {
                    let scope = Environment::child(env);
                    return Ok(Action::Enter(Frame::block(Rc::clone(body), scope)));
                }
            }

            Stmt::Loop(stmt) => {
                if self.condition(&stmt.condition, env)? {
                    return Ok(Action::Enter(Frame::looping(Rc::clone(stmt), env)));
                }
            }

            Stmt::Each(stmt) => {
                let iterable = self.evaluate(&stmt.iterable, env)?;
                let mut source = self.each_source(iterable)?;
                if let Some(first) = self.next_item(&mut source)? {
                    return Ok(Action::Enter(Frame::each(Rc::clone(stmt), env, source, first)));
                }
            }

            Stmt::Match { subject, arms, otherwise, .. } => {
                let subject = self.evaluate(subject, env)?;
                for arm in arms {
                    if self.pattern_matches(&arm.pattern, &subject, env)? {
                        let scope = Environment::child(env);
                        return Ok(Action::Enter(Frame::block(Rc::clone(&arm.body), scope)));
                    }
                }
                if let Some(body) = otherwise {
                    let scope = Environment::child(env);
                    return Ok(Action::Enter(Frame::block(Rc::clone(body), scope)));
                }
            }

            Stmt::Try(stmt) => {
                return Ok(Action::Enter(Frame::guarded(Rc::clone(stmt), env)));
            }

            Stmt::Function(decl) => {
                let function = Function {
                    decl: Rc::clone(decl),
                    closure: Rc::clone(env),
                };
                env.borrow_mut()
                    .define(decl.name.clone(), Value::Function(Rc::new(function)), Type::Job);
            }

            Stmt::Object(decl) => {
                self.objects.declare(decl, env)?;
            }
        }

        Ok(Action::Next)
    }

    /// Evaluate a condition that must produce a Truth
    pub(crate) fn condition(&mut self, expr: &Expr, env: &Env) -> RuntimeResult<bool> {
        let value = self.evaluate(expr, env)?;
        truth(&value, "condition")
    }

    fn pattern_matches(&mut self, pattern: &Pattern, value: &Value, env: &Env) -> RuntimeResult<bool> {
        match pattern {
            Pattern::Type(ty) => Ok(types::is_assignable(ty, value, &self.objects)),
            Pattern::Value(expr) => Ok(self.evaluate(expr, env)? == *value),
        }
    }

    fn each_source(&mut self, iterable: Value) -> RuntimeResult<EachSource> {
        let items = match &iterable {
            Value::List(list) => list.borrow().items.clone(),
            Value::Mapping(map) => map.borrow().entries.iter().map(|(k, _)| k.clone()).collect(),
            Value::Text(text) => text.chars().map(|c| Value::text(&c.to_string())).collect(),
            Value::Stream(_) => return Ok(EachSource::Stream(iterable)),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "cannot loop over {}",
                    other.kind_name()
                )));
            }
        };
        Ok(EachSource::Items { items, next: 0 })
    }

    fn assign(&mut self, target: &Expr, value: Value, env: &Env) -> RuntimeResult<()> {
        match target {
            Expr::Ident { name, .. } => {
                let declared = env.borrow().declared_type(name)?;
                types::expect_type(&declared, &value, &format!("'{}'", name), &self.objects)?;
                types::adopt_tags(&declared, &value);
                env.borrow_mut().assign(name, value)
            }

            Expr::Member { object, name, .. } => {
                let receiver = self.evaluate(object, env)?;
                let Value::Object(instance) = &receiver else {
                    return Err(RuntimeError::type_error(format!(
                        "cannot set '{}' on {}",
                        name,
                        receiver.kind_name()
                    )));
                };
                let type_name = instance.borrow().type_name.clone();
                let Some(declared) = self.objects.field_type(&type_name, name) else {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::Name,
                        format!("{} has no field '{}'", type_name, name),
                    ));
                };
                let what = format!("field '{}' of {}", name, type_name);
                types::expect_type(&declared, &value, &what, &self.objects)?;
                types::adopt_tags(&declared, &value);
                instance.borrow_mut().set(name, value);
                Ok(())
            }

            Expr::Index { object, index, .. } => {
                let target = self.evaluate(object, env)?;
                let index = self.evaluate(index, env)?;
                self.set_index(&target, index, value)
            }

            _ => Err(RuntimeError::type_error("invalid assignment target")),
        }
    }

    // ==================== Expressions ====================

    pub(crate) fn evaluate(&mut self, expr: &Expr, env: &Env) -> RuntimeResult<Value> {
        // Every nested call passes through here; grow the native stack
        // before a deep script recursion can exhaust it
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.evaluate_inner(expr, env))
            .map_err(|e| e.at(expr.span()))
    }

    fn evaluate_inner(&mut self, expr: &Expr, env: &Env) -> RuntimeResult<Value> {
        match expr {
            Expr::Whole { value, .. } => Ok(Value::Whole(*value)),
            Expr::Decimal { value, .. } => Ok(Value::Decimal(*value)),
            Expr::Text { value, .. } => Ok(Value::text(value)),
            Expr::Truth { value, .. } => Ok(Value::Truth(*value)),
            Expr::Void { .. } => Ok(Value::Void),

            Expr::Template { parts, .. } => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(s) => text.push_str(s),
                        TemplatePart::Expr(expr) => {
                            let value = self.evaluate(expr, env)?;
                            text.push_str(&value.to_string());
                        }
                    }
                }
                Ok(Value::text(&text))
            }

            Expr::Ident { name, .. } => env.borrow().get(name),

            Expr::My { .. } => env.borrow().get("my").map_err(|_| {
                RuntimeError::new(
                    RuntimeErrorKind::Name,
                    "'my' is only available inside Object methods and constructors",
                )
            }),

            Expr::Binary { left, op, right, .. } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                binary(*op, &left, &right)
            }

            Expr::Logical { left, op, right, .. } => {
                let left = self.evaluate(left, env)?;
                let left = truth(&left, &format!("left side of '{}'", logical_name(*op)))?;
                let short = match op {
                    LogicalOp::And => !left,
                    LogicalOp::Or => left,
                };
                if short {
                    return Ok(Value::Truth(left));
                }
                let right = self.evaluate(right, env)?;
                let right = truth(&right, &format!("right side of '{}'", logical_name(*op)))?;
                Ok(Value::Truth(right))
            }

            Expr::Unary { op, operand, .. } => {
                let value = self.evaluate(operand, env)?;
                match (op, &value) {
                    (UnaryOp::Neg, Value::Whole(n)) => n
                        .checked_neg()
                        .map(Value::Whole)
                        .ok_or_else(|| overflow(format!("-({})", n))),
                    (UnaryOp::Neg, Value::Decimal(n)) => Ok(Value::Decimal(-n)),
                    (UnaryOp::Not, Value::Truth(b)) => Ok(Value::Truth(!b)),
                    (UnaryOp::Neg, other) => Err(RuntimeError::type_error(format!(
                        "cannot negate {}",
                        other.kind_name()
                    ))),
                    (UnaryOp::Not, other) => Err(RuntimeError::type_error(format!(
                        "'not' expects Truth, got {}",
                        other.kind_name()
                    ))),
                }
            }

            Expr::Call { callee, args, .. } => {
                if let Expr::Member { object, name, .. } = callee.as_ref() {
                    let receiver = self.evaluate(object, env)?;
                    let args = self.evaluate_all(args, env)?;
                    return self.call_member(receiver, name, args);
                }
                let callee = self.evaluate(callee, env)?;
                let args = self.evaluate_all(args, env)?;
                self.call(&callee, args)
            }

            Expr::Member { object, name, .. } => {
                let receiver = self.evaluate(object, env)?;
                self.member(receiver, name)
            }

            Expr::Index { object, index, .. } => {
                let target = self.evaluate(object, env)?;
                let index = self.evaluate(index, env)?;
                self.get_index(&target, &index)
            }

            Expr::List { items, .. } => {
                let items = self.evaluate_all(items, env)?;
                Ok(Value::list(Type::Any, items))
            }

            Expr::Mapping { entries, .. } => {
                let mut mapping = MappingValue {
                    key: Type::Any,
                    value: Type::Any,
                    entries: Vec::with_capacity(entries.len()),
                };
                for (key, value) in entries {
                    let key = self.evaluate(key, env)?;
                    let value = self.evaluate(value, env)?;
                    mapping.insert(key, value);
                }
                Ok(Value::Mapping(Rc::new(RefCell::new(mapping))))
            }

            Expr::New { type_name, args, .. } => {
                let args = self.evaluate_all(args, env)?;
                self.construct(type_name, args)
            }

            Expr::Await { operand, .. } => {
                let value = self.evaluate(operand, env)?;
                self.await_value(value)
            }
        }
    }

    fn evaluate_all(&mut self, exprs: &[Expr], env: &Env) -> RuntimeResult<Vec<Value>> {
        exprs.iter().map(|expr| self.evaluate(expr, env)).collect()
    }

    // ==================== Calls ====================

    /// Call a function or bound method value
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> RuntimeResult<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, None, args),
            Value::Method(method) => {
                self.call_function(&method.function, Some(method.receiver.clone()), args)
            }
            other => Err(RuntimeError::type_error(format!(
                "{} is not callable",
                other.kind_name()
            ))),
        }
    }

    /// Bind arguments and start the body according to the function's kind
    pub(crate) fn call_function(
        &mut self,
        function: &Function,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        let decl = &function.decl;
        types::check_call(decl, &args, &self.objects)?;

        let env = Environment::child(&function.closure);
        {
            let mut scope = env.borrow_mut();
            if let Some(receiver) = receiver {
                scope.define("my", receiver, Type::Any);
            }
            for (param, arg) in decl.params.iter().zip(args) {
                types::adopt_tags(&param.ty, &arg);
                scope.define(param.name.clone(), arg, param.ty.clone());
            }
        }

        match decl.kind {
            FunctionKind::Job => {
                let mut machine = Machine::new(Rc::clone(&decl.body), env);
                self.run_body(decl, &mut machine)
            }
            FunctionKind::Task => {
                let machine = Machine::task(Rc::clone(&decl.body), env);
                Ok(self.start_task(decl, machine))
            }
            FunctionKind::Stream => {
                let machine = Machine::new(Rc::clone(&decl.body), env);
                let stream = StreamValue {
                    name: decl.name.clone(),
                    elem: decl.returns.clone().unwrap_or(Type::Any),
                    state: StreamState::NotStarted(machine),
                };
                Ok(Value::Stream(Rc::new(RefCell::new(stream))))
            }
        }
    }

    /// Run a Job body to the end and check its output
    pub(crate) fn run_body(&mut self, decl: &FunctionDecl, machine: &mut Machine) -> RuntimeResult<Value> {
        self.enter_call(&decl.name)?;
        self.trace(format_args!("call {} (depth {})", decl.name, self.depth));
        let result = self.run_machine(machine);
        self.depth -= 1;

        match result? {
            Halt::Finished(value) => self.check_output(decl, value),
            Halt::Emitted(_) | Halt::Parked => Err(RuntimeError::type_error(format!(
                "{} {} cannot emit",
                decl.kind, decl.name
            ))),
        }
    }

    /// Check a finished body's value against the declared output type
    pub(crate) fn check_output(&self, decl: &FunctionDecl, value: Value) -> RuntimeResult<Value> {
        if let Some(declared) = &decl.returns {
            let what = format!("output of {}", decl.name);
            types::expect_type(declared, &value, &what, &self.objects)?;
            types::adopt_tags(declared, &value);
        }
        Ok(value)
    }

    pub(crate) fn enter_call(&mut self, name: &str) -> RuntimeResult<()> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::new(
                RuntimeErrorKind::StackOverflow,
                format!("call depth exceeded {} in {}", self.config.max_call_depth, name),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    // ==================== Streams ====================

    /// Run a stream until its next `emit`, `output` or the end of its body
    pub fn resume_stream(&mut self, stream: &Value) -> RuntimeResult<StreamStep> {
        let Value::Stream(handle) = stream else {
            return Err(RuntimeError::type_error(format!(
                "expected a Stream, got {}",
                stream.kind_name()
            )));
        };

        let (name, elem) = {
            let stream = handle.borrow();
            (stream.name.clone(), stream.elem.clone())
        };

        let mut machine = {
            let mut stream = handle.borrow_mut();
            match std::mem::replace(&mut stream.state, StreamState::Running) {
                StreamState::NotStarted(machine) | StreamState::Suspended(machine) => machine,
                StreamState::Running => {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::Reentrancy,
                        format!("stream {} resumed while it is running", name),
                    ));
                }
                StreamState::Exhausted => {
                    stream.state = StreamState::Exhausted;
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::StreamExhausted,
                        format!("stream {} is exhausted", name),
                    ));
                }
            }
        };

        if let Err(error) = self.enter_call(&name) {
            handle.borrow_mut().state = StreamState::Suspended(machine);
            return Err(error);
        }
        self.trace(format_args!("resume stream {}", name));
        let result = self.run_machine(&mut machine);
        self.depth -= 1;

        match result {
            Ok(Halt::Emitted(value)) => {
                handle.borrow_mut().state = StreamState::Suspended(machine);
                let what = format!("value emitted by {}", name);
                types::expect_type(&elem, &value, &what, &self.objects)?;
                Ok(StreamStep::Emitted(value))
            }
            Ok(Halt::Finished(value)) => {
                handle.borrow_mut().state = StreamState::Exhausted;
                self.trace(format_args!("stream {} exhausted", name));
                // Falling off the end finishes with void whatever the element type
                if !matches!(value, Value::Void) {
                    let what = format!("output of {}", name);
                    types::expect_type(&elem, &value, &what, &self.objects)?;
                }
                Ok(StreamStep::Finished(value))
            }
            Ok(Halt::Parked) => unreachable!("stream machines never park"),
            Err(error) => {
                handle.borrow_mut().state = StreamState::Exhausted;
                Err(error)
            }
        }
    }

    // ==================== Objects ====================

    /// `new T using args`: defaults and field initializers from the root
    /// ancestor down, then the nearest constructor
    fn construct(&mut self, type_name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        if !self.objects.contains(type_name) {
            return Err(RuntimeError::name_error(type_name));
        }

        let instance = ObjectValue::shared(type_name, Vec::new());
        let receiver = Value::Object(Rc::clone(&instance));

        for owner in self.objects.ancestry(type_name) {
            for field in &owner.fields {
                let value = match &field.init {
                    Some(init) => {
                        let scope = Environment::child(&owner.closure);
                        scope.borrow_mut().define("my", receiver.clone(), Type::Any);
                        let value = self.evaluate(init, &scope)?;
                        let what = format!("field '{}' of {}", field.name, owner.name);
                        types::expect_type(&field.ty, &value, &what, &self.objects)?;
                        types::adopt_tags(&field.ty, &value);
                        value
                    }
                    None => field.ty.default_value(),
                };
                instance.borrow_mut().set(&field.name, value);
            }
        }

        match self.objects.constructor_owner(type_name) {
            Some(owner) => {
                let Some(constructor) = select_constructor(&owner.constructors, args.len()) else {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::Arity,
                        format!("no constructor of {} takes {} argument(s)", type_name, args.len()),
                    ));
                };
                let constructor = Rc::clone(constructor);
                self.run_constructor(&owner, &constructor, receiver.clone(), args)?;
            }
            None if args.is_empty() => {}
            None => return Err(RuntimeError::arity(type_name, 0, args.len())),
        }

        Ok(receiver)
    }

    fn run_constructor(
        &mut self,
        owner: &ObjectType,
        constructor: &Constructor,
        receiver: Value,
        args: Vec<Value>,
    ) -> RuntimeResult<()> {
        let env = Environment::child(&owner.closure);
        env.borrow_mut().define("my", receiver, Type::Any);

        let given = args.len();
        let mut args = args.into_iter();
        for param in &constructor.params {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.evaluate(default, &env)?,
                (None, None) => {
                    return Err(RuntimeError::arity(&owner.name, constructor.params.len(), given));
                }
            };
            let what = format!("parameter '{}' of {}", param.name, owner.name);
            types::expect_type(&param.ty, &value, &what, &self.objects)?;
            types::adopt_tags(&param.ty, &value);
            env.borrow_mut().define(param.name.clone(), value, param.ty.clone());
        }

        self.enter_call(&owner.name)?;
        let result = self.run_machine(&mut Machine::new(Rc::clone(&constructor.body), env));
        self.depth -= 1;
        result.map(|_| ())
    }

    /// Member read: fields first, then methods along the inheritance chain
    pub(crate) fn member(&mut self, receiver: Value, name: &str) -> RuntimeResult<Value> {
        let Value::Object(instance) = &receiver else {
            return self.call_builtin(receiver, name, Vec::new());
        };

        let field = instance.borrow().get(name);
        if let Some(value) = field {
            return Ok(value);
        }

        let type_name = instance.borrow().type_name.clone();
        match self.objects.find_method(&type_name, name) {
            Some(function) => Ok(Value::Method(Rc::new(BoundMethod {
                receiver: receiver.clone(),
                function,
            }))),
            None => Err(no_member(&type_name, name)),
        }
    }

    /// `receiver.name(args)`
    pub(crate) fn call_member(&mut self, receiver: Value, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let Value::Object(instance) = &receiver else {
            return self.call_builtin(receiver, name, args);
        };

        let field = instance.borrow().get(name);
        if let Some(value) = field {
            return self.call(&value, args);
        }

        let type_name = instance.borrow().type_name.clone();
        match self.objects.find_method(&type_name, name) {
            Some(function) => self.call_function(&function, Some(receiver.clone()), args),
            None => Err(no_member(&type_name, name)),
        }
    }

    /// The Object a caught error is bound to in its handler
    pub(crate) fn error_value(&mut self, error: &RuntimeError) -> Value {
        let type_name = error.type_name();
        if !self.objects.contains(type_name) {
            self.objects.declare_plain(type_name, Some(ERROR_TYPE));
        }
        let fields = vec![
            ("message".to_string(), Value::text(&error.message)),
            ("payload".to_string(), error.payload.clone()),
        ];
        Value::Object(ObjectValue::shared(type_name, fields))
    }

    // ==================== Indexing ====================

    fn get_index(&mut self, target: &Value, index: &Value) -> RuntimeResult<Value> {
        match (target, index) {
            (Value::List(list), Value::Whole(i)) => {
                let list = list.borrow();
                let position = list_position(&list, *i)?;
                Ok(list.items[position].clone())
            }
            (Value::Text(text), Value::Whole(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| text.chars().nth(i))
                .map(|c| Value::text(&c.to_string()))
                .ok_or_else(|| {
                    RuntimeError::new(
                        RuntimeErrorKind::Index,
                        format!("index {} out of range for Text of length {}", i, text.chars().count()),
                    )
                }),
            (Value::Mapping(map), key) => map
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| missing_key(key)),
            (target, index) => Err(RuntimeError::type_error(format!(
                "cannot index {} with {}",
                target.kind_name(),
                index.kind_name()
            ))),
        }
    }

    fn set_index(&mut self, target: &Value, index: Value, value: Value) -> RuntimeResult<()> {
        match (target, &index) {
            (Value::List(list), Value::Whole(i)) => {
                let elem = list.borrow().elem.clone();
                types::expect_type(&elem, &value, "list element", &self.objects)?;
                let mut list = list.borrow_mut();
                let position = list_position(&list, *i)?;
                list.items[position] = value;
                Ok(())
            }
            (Value::Mapping(map), _) => {
                let (key_type, value_type) = {
                    let map = map.borrow();
                    (map.key.clone(), map.value.clone())
                };
                types::expect_type(&key_type, &index, "mapping key", &self.objects)?;
                types::expect_type(&value_type, &value, "mapping value", &self.objects)?;
                map.borrow_mut().insert(index, value);
                Ok(())
            }
            (target, index) => Err(RuntimeError::type_error(format!(
                "cannot assign into {} with {}",
                target.kind_name(),
                index.kind_name()
            ))),
        }
    }
}

// ==================== Operators ====================

pub(crate) fn truth(value: &Value, what: &str) -> RuntimeResult<bool> {
    match value {
        Value::Truth(b) => Ok(*b),
        other => Err(RuntimeError::type_error(format!(
            "{} must be Truth, got {}",
            what,
            other.kind_name()
        ))),
    }
}

fn logical_name(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "and",
        LogicalOp::Or => "or",
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> RuntimeResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Truth(left == right)),
        BinaryOp::Ne => Ok(Value::Truth(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> RuntimeResult<Value> {
    match (left, right) {
        (Value::Whole(a), Value::Whole(b)) => whole_arithmetic(op, *a, *b),
        (Value::Whole(a), Value::Decimal(b)) => decimal_arithmetic(op, *a as f64, *b),
        (Value::Decimal(a), Value::Whole(b)) => decimal_arithmetic(op, *a, *b as f64),
        (Value::Decimal(a), Value::Decimal(b)) => decimal_arithmetic(op, *a, *b),
        (Value::Text(a), Value::Text(b)) if op == BinaryOp::Add => {
            Ok(Value::text(&format!("{}{}", a, b)))
        }
        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            let (a, b) = (a.borrow(), b.borrow());
            let elem = if a.elem == b.elem { a.elem.clone() } else { Type::Any };
            let items = a.items.iter().chain(b.items.iter()).cloned().collect();
            Ok(Value::List(Rc::new(RefCell::new(ListValue { elem, items }))))
        }
        _ => Err(RuntimeError::type_error(format!(
            "cannot apply '{}' to {} and {}",
            op,
            left.kind_name(),
            right.kind_name()
        ))),
    }
}

fn whole_arithmetic(op: BinaryOp, a: i64, b: i64) -> RuntimeResult<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0 {
        return Err(divide_by_zero(op));
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        _ => a.checked_rem(b),
    };
    result
        .map(Value::Whole)
        .ok_or_else(|| overflow(format!("{} {} {}", a, op, b)))
}

fn decimal_arithmetic(op: BinaryOp, a: f64, b: f64) -> RuntimeResult<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
        return Err(divide_by_zero(op));
    }
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a % b,
    };
    Ok(Value::Decimal(result))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> RuntimeResult<Value> {
    let ordering = match (left, right) {
        (Value::Whole(a), Value::Whole(b)) => a.partial_cmp(b),
        (Value::Whole(a), Value::Decimal(b)) => (*a as f64).partial_cmp(b),
        (Value::Decimal(a), Value::Whole(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
        _ => {
            return Err(RuntimeError::type_error(format!(
                "cannot compare {} and {} with '{}'",
                left.kind_name(),
                right.kind_name(),
                op
            )));
        }
    };

    // NaN compares false with everything
    let Some(ordering) = ordering else {
        return Ok(Value::Truth(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Truth(result))
}

fn divide_by_zero(op: BinaryOp) -> RuntimeError {
    let what = if op == BinaryOp::Mod { "modulo" } else { "division" };
    RuntimeError::new(RuntimeErrorKind::DivideByZero, format!("{} by zero", what))
}

fn overflow(expression: String) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::Overflow,
        format!("{} does not fit in a Whole", expression),
    )
}

fn list_position(list: &ListValue, index: i64) -> RuntimeResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < list.items.len())
        .ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::Index,
                format!("index {} out of range for List of length {}", index, list.items.len()),
            )
        })
}

fn missing_key(key: &Value) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::Key, format!("key {} not found", key.repr()))
}

pub(crate) fn no_member(type_name: &str, name: &str) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::Name,
        format!("{} has no member '{}'", type_name, name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn interpreter_for(source: &str) -> (Interpreter, RuntimeResult<()>) {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::default();
        let result = interpreter.interpret(&program);
        (interpreter, result)
    }

    #[test]
    fn test_whole_arithmetic() {
        assert_eq!(binary(BinaryOp::Div, &Value::Whole(7), &Value::Whole(2)).unwrap(), Value::Whole(3));
        assert_eq!(binary(BinaryOp::Mod, &Value::Whole(7), &Value::Whole(2)).unwrap(), Value::Whole(1));
        let err = binary(BinaryOp::Add, &Value::Whole(i64::MAX), &Value::Whole(1)).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Overflow);
    }

    #[test]
    fn test_mixed_arithmetic_promotes() {
        let sum = binary(BinaryOp::Add, &Value::Whole(2), &Value::Decimal(3.5)).unwrap();
        assert_eq!(sum, Value::Decimal(5.5));
    }

    #[test]
    fn test_divide_by_zero() {
        for (op, right) in [
            (BinaryOp::Div, Value::Whole(0)),
            (BinaryOp::Mod, Value::Whole(0)),
            (BinaryOp::Div, Value::Decimal(0.0)),
        ] {
            let err = binary(op, &Value::Whole(5), &right).unwrap_err();
            assert_eq!(err.kind, RuntimeErrorKind::DivideByZero);
        }
    }

    #[test]
    fn test_comparison_rejects_mixed_kinds() {
        let err = binary(BinaryOp::Lt, &Value::Whole(1), &Value::text("2")).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Type);
        assert_eq!(
            binary(BinaryOp::Lt, &Value::text("a"), &Value::text("b")).unwrap(),
            Value::Truth(true)
        );
    }

    #[test]
    fn test_condition_must_be_truth() {
        let (_, result) = interpreter_for("when 1:\n    show \"no\"\n");
        assert_eq!(result.unwrap_err().kind, RuntimeErrorKind::Type);
    }

    #[test]
    fn test_globals_persist_between_programs() {
        let (mut interpreter, result) = interpreter_for("x as Whole is 41\n");
        result.unwrap();
        let tokens = Lexer::new("x is x + 1\nshow x\n").tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        interpreter.interpret(&program).unwrap();
        assert_eq!(interpreter.take_output(), vec!["42"]);
        assert_eq!(interpreter.global("x"), Some(Value::Whole(42)));
    }

    #[test]
    fn test_errors_carry_position() {
        let (_, result) = interpreter_for("x as Whole is 1\nshow x / 0\n");
        let err = result.unwrap_err();
        assert_eq!(err.span.map(|s| s.line), Some(2));
    }

    #[test]
    fn test_call_depth_limit() {
        let source = "Job down requires n as Whole:\n    output down using n + 1\ndown using 0\n";
        let tokens = Lexer::new(source).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::new(Config::default().with_max_call_depth(16));
        let err = interpreter.interpret(&program).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::StackOverflow);
    }
}
