//! Resumable statement execution
//!
//! Statements run on an explicit stack of frames instead of the Rust call
//! stack, so a Stream can stop at `emit` and continue later from the same
//! place with the same scopes. A Task machine also stops before each
//! statement that awaits, so the caller can carry on while the Task waits
//! its turn on the scheduler. Program bodies, Jobs and constructors run
//! their machine straight to the end.

use std::rc::Rc;

use crate::ast::{Block, EachStmt, LoopStmt, TryStmt};
use crate::environment::{Env, Environment};
use crate::error::{RuntimeError, RuntimeResult};
use crate::interpreter::Interpreter;
use crate::types::Type;
use crate::value::{StreamState, Value};

/// Outcome of running a machine until it stops
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStep {
    /// Stopped at `emit`; the machine can be resumed
    Emitted(Value),
    /// Reached `output` or the end of the body
    Finished(Value),
}

/// Why `run_machine` returned
pub(crate) enum Halt {
    Emitted(Value),
    /// A Task stopped in front of a statement that awaits
    Parked,
    Finished(Value),
}

/// A suspended or fresh statement executor
pub struct Machine {
    frames: Vec<Frame>,
    parks_at_await: bool,
    /// The statement at the current position already gave way once
    gave_way: bool,
}

impl Machine {
    /// Machine that will run `block` in `env`
    pub fn new(block: Block, env: Env) -> Self {
        Self {
            frames: vec![Frame::block(block, env)],
            parks_at_await: false,
            gave_way: false,
        }
    }

    /// Machine for a Task body
    pub fn task(block: Block, env: Env) -> Self {
        Self {
            parks_at_await: true,
            ..Self::new(block, env)
        }
    }
}

/// One block being executed
pub(crate) struct Frame {
    block: Block,
    pc: usize,
    env: Env,
    kind: FrameKind,
}

enum FrameKind {
    Plain,
    /// Body of `loop while`; the condition is re-checked after each pass
    Loop { stmt: Rc<LoopStmt>, outer: Env },
    /// Body of `loop each`
    Each { stmt: Rc<EachStmt>, outer: Env, source: EachSource },
    /// A `do` statement in one of its three phases
    Guarded {
        stmt: Rc<TryStmt>,
        outer: Env,
        phase: Phase,
        /// What to resume with once `always` has run
        pending: Option<Completion>,
    },
}

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Body,
    Handler,
    Always,
}

/// Where the items of a `loop each` come from
pub(crate) enum EachSource {
    Items { items: Vec<Value>, next: usize },
    Stream(Value),
}

/// A non-local exit travelling up the frame stack
enum Completion {
    Output(Value),
    Raise(RuntimeError),
}

/// What executing one statement asks the machine to do
pub(crate) enum Action {
    Next,
    Enter(Frame),
    Output(Value),
    Emit(Value),
}

impl Frame {
    pub(crate) fn block(block: Block, env: Env) -> Self {
        Self { block, pc: 0, env, kind: FrameKind::Plain }
    }

    pub(crate) fn looping(stmt: Rc<LoopStmt>, outer: &Env) -> Self {
        Self {
            block: Rc::clone(&stmt.body),
            pc: 0,
            env: Environment::child(outer),
            kind: FrameKind::Loop { stmt, outer: Rc::clone(outer) },
        }
    }

    /// First pass of a `loop each`, with `first` already taken from `source`
    pub(crate) fn each(stmt: Rc<EachStmt>, outer: &Env, source: EachSource, first: Value) -> Self {
        let env = Environment::child(outer);
        env.borrow_mut().define(stmt.variable.clone(), first, Type::Any);
        Self {
            block: Rc::clone(&stmt.body),
            pc: 0,
            env,
            kind: FrameKind::Each { stmt, outer: Rc::clone(outer), source },
        }
    }

    pub(crate) fn guarded(stmt: Rc<TryStmt>, outer: &Env) -> Self {
        Self {
            block: Rc::clone(&stmt.body),
            pc: 0,
            env: Environment::child(outer),
            kind: FrameKind::Guarded {
                stmt,
                outer: Rc::clone(outer),
                phase: Phase::Body,
                pending: None,
            },
        }
    }
}

impl Interpreter {
    /// Run until the machine emits, parks, outputs, finishes its body or fails
    pub(crate) fn run_machine(&mut self, machine: &mut Machine) -> RuntimeResult<Halt> {
        loop {
            let Some(frame) = machine.frames.last_mut() else {
                return Ok(Halt::Finished(Value::Void));
            };

            if frame.pc >= frame.block.len() {
                if let Some(done) = self.finish_frame(machine) {
                    return done;
                }
                continue;
            }

            let block = Rc::clone(&frame.block);
            let env = Rc::clone(&frame.env);
            let stmt = &block[frame.pc];

            if machine.parks_at_await && stmt.awaits() && !std::mem::take(&mut machine.gave_way) {
                machine.gave_way = true;
                return Ok(Halt::Parked);
            }
            frame.pc += 1;

            let completion = match self.execute(stmt, &env) {
                Ok(Action::Next) => continue,
                Ok(Action::Enter(frame)) => {
                    machine.frames.push(frame);
                    continue;
                }
                Ok(Action::Emit(value)) => return Ok(Halt::Emitted(value)),
                Ok(Action::Output(value)) => Completion::Output(value),
                Err(error) => Completion::Raise(error.at(stmt.span())),
            };

            if let Some(done) = self.unwind(machine, completion) {
                return done;
            }
        }
    }

    /// The top frame ran out of statements
    fn finish_frame(&mut self, machine: &mut Machine) -> Option<RuntimeResult<Halt>> {
        let mut frame = machine.frames.pop()?;

        match &mut frame.kind {
            FrameKind::Plain => None,
            FrameKind::Loop { stmt, outer } => match self.condition(&stmt.condition, outer) {
                Ok(true) => {
                    frame.env = Environment::child(outer);
                    frame.pc = 0;
                    machine.frames.push(frame);
                    None
                }
                Ok(false) => None,
                Err(error) => {
                    let error = error.at(stmt.span);
                    self.unwind(machine, Completion::Raise(error))
                }
            },
            FrameKind::Each { stmt, outer, source } => match self.next_item(source) {
                Ok(Some(item)) => {
                    let env = Environment::child(outer);
                    env.borrow_mut().define(stmt.variable.clone(), item, Type::Any);
                    frame.env = env;
                    frame.pc = 0;
                    machine.frames.push(frame);
                    None
                }
                Ok(None) => None,
                Err(error) => {
                    let error = error.at(stmt.span);
                    self.unwind(machine, Completion::Raise(error))
                }
            },
            FrameKind::Guarded { stmt, outer, phase, pending } => match *phase {
                Phase::Body | Phase::Handler => {
                    if let Some(always) = &stmt.always {
                        frame.block = Rc::clone(always);
                        frame.env = Environment::child(outer);
                        frame.pc = 0;
                        *phase = Phase::Always;
                        machine.frames.push(frame);
                    }
                    None
                }
                Phase::Always => match pending.take() {
                    Some(completion) => self.unwind(machine, completion),
                    None => None,
                },
            },
        }
    }

    /// Pop frames until a `do` statement takes over the completion.
    /// Returns the machine's final result when nothing does.
    fn unwind(
        &mut self,
        machine: &mut Machine,
        completion: Completion,
    ) -> Option<RuntimeResult<Halt>> {
        while let Some(mut frame) = machine.frames.pop() {
            let FrameKind::Guarded { stmt, outer, phase, pending } = &mut frame.kind else {
                continue;
            };

            if *phase == Phase::Body {
                if let Completion::Raise(error) = &completion {
                    let handler = stmt
                        .handlers
                        .iter()
                        .find(|h| self.objects.is_a(error.type_name(), &h.error_type));
                    if let Some(handler) = handler {
                        let env = Environment::child(outer);
                        let value = self.error_value(error);
                        env.borrow_mut().define(
                            handler.name.clone(),
                            value,
                            Type::Object(handler.error_type.clone()),
                        );
                        frame.block = Rc::clone(&handler.body);
                        frame.env = env;
                        frame.pc = 0;
                        *phase = Phase::Handler;
                        machine.frames.push(frame);
                        return None;
                    }
                }
            }

            // A completion escaping `always` replaces whatever was pending
            if *phase != Phase::Always {
                if let Some(always) = &stmt.always {
                    frame.block = Rc::clone(always);
                    frame.env = Environment::child(outer);
                    frame.pc = 0;
                    *phase = Phase::Always;
                    *pending = Some(completion);
                    machine.frames.push(frame);
                    return None;
                }
            }
        }

        Some(match completion {
            Completion::Output(value) => Ok(Halt::Finished(value)),
            Completion::Raise(error) => Err(error),
        })
    }

    /// Next value for a `loop each`, or `None` when the source is used up
    pub(crate) fn next_item(&mut self, source: &mut EachSource) -> RuntimeResult<Option<Value>> {
        match source {
            EachSource::Items { items, next } => {
                let item = items.get(*next).cloned();
                *next += 1;
                Ok(item)
            }
            EachSource::Stream(stream) => {
                if let Value::Stream(handle) = stream {
                    if matches!(handle.borrow().state, StreamState::Exhausted) {
                        return Ok(None);
                    }
                }
                match self.resume_stream(stream)? {
                    StreamStep::Emitted(value) => Ok(Some(value)),
                    StreamStep::Finished(_) => Ok(None),
                }
            }
        }
    }
}
