//! Cooperative task scheduler
//!
//! Calling a Task runs its body right away, up to the first statement that
//! awaits. A Task that finishes before that settles its promise before the
//! call returns. One that reaches an `await` parks here and the caller gets
//! a Pending promise. Parked tasks resume one at a time in the order they
//! parked, either when something awaits an unsettled promise or when the
//! program body has finished.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::interpreter::Interpreter;
use crate::machine::{Halt, Machine};
use crate::types::Type;
use crate::value::{PromiseState, PromiseValue, Value};

/// A parked task body and the promise it settles
pub(crate) struct PendingTask {
    decl: Rc<FunctionDecl>,
    machine: Machine,
    promise: Rc<RefCell<PromiseValue>>,
}

/// FIFO ready queue
#[derive(Default)]
pub struct Scheduler {
    ready: VecDeque<PendingTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, task: PendingTask) {
        self.ready.push_back(task);
    }

    pub(crate) fn pop(&mut self) -> Option<PendingTask> {
        self.ready.pop_front()
    }

    /// Number of parked tasks
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

impl Interpreter {
    /// Start a Task body and return its promise
    pub(crate) fn start_task(&mut self, decl: &Rc<FunctionDecl>, machine: Machine) -> Value {
        let promise = Rc::new(RefCell::new(PromiseValue {
            name: decl.name.clone(),
            result: decl.returns.clone().unwrap_or(Type::Any),
            state: PromiseState::Pending,
        }));

        self.step_task(PendingTask {
            decl: Rc::clone(decl),
            machine,
            promise: Rc::clone(&promise),
        });

        Value::Promise(promise)
    }

    /// Run a task until it parks again or settles its promise
    fn step_task(&mut self, mut task: PendingTask) {
        task.promise.borrow_mut().state = PromiseState::Running;

        let result = match self.enter_call(&task.decl.name) {
            Ok(()) => {
                self.trace(format_args!("running task {} (depth {})", task.decl.name, self.depth));
                let result = self.run_machine(&mut task.machine);
                self.depth -= 1;
                result
            }
            Err(error) => Err(error),
        };

        let state = match result {
            Ok(Halt::Parked) => {
                task.promise.borrow_mut().state = PromiseState::Pending;
                self.scheduler.push(task);
                self.trace(format_args!("task parked ({} waiting)", self.scheduler.len()));
                return;
            }
            Ok(Halt::Finished(value)) => match self.check_output(&task.decl, value) {
                Ok(value) => PromiseState::Fulfilled(value),
                Err(error) => PromiseState::Failed(error),
            },
            Ok(Halt::Emitted(_)) => PromiseState::Failed(RuntimeError::type_error(format!(
                "Task {} cannot emit",
                task.decl.name
            ))),
            Err(error) => {
                self.trace(format_args!("task {} failed: {}", task.decl.name, error));
                PromiseState::Failed(error)
            }
        };
        task.promise.borrow_mut().state = state;
    }

    /// Resume the task that parked first. False when none is parked.
    pub(crate) fn run_next_task(&mut self) -> bool {
        match self.scheduler.pop() {
            Some(task) => {
                self.step_task(task);
                true
            }
            None => false,
        }
    }

    /// Resume parked tasks until none is left, including ones that park again
    pub(crate) fn drain_tasks(&mut self) {
        while self.run_next_task() {}
    }

    /// Value of a promise, resuming parked tasks until it settles
    pub(crate) fn await_value(&mut self, value: Value) -> RuntimeResult<Value> {
        let Value::Promise(promise) = &value else {
            return Err(RuntimeError::type_error(format!(
                "await expects a Promise, got {}",
                value.kind_name()
            )));
        };

        loop {
            let settled = {
                let promise = promise.borrow();
                match &promise.state {
                    PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
                    PromiseState::Failed(error) => Some(Err(error.clone())),
                    PromiseState::Running => Some(Err(RuntimeError::new(
                        RuntimeErrorKind::Reentrancy,
                        format!("task {} awaits its own promise", promise.name),
                    ))),
                    PromiseState::Pending => None,
                }
            };
            if let Some(result) = settled {
                return result;
            }

            if !self.run_next_task() {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::Reentrancy,
                    format!("promise of {} can never settle", promise.borrow().name),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn program(source: &str) -> crate::ast::Program {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    #[test]
    fn test_task_without_await_settles_on_call() {
        let source = "\
Task answer returning Whole:
    output 42
p as Promise is answer()
";
        let mut interpreter = Interpreter::new(Config::default().with_drain_tasks(false));
        interpreter.interpret(&program(source)).unwrap();
        assert!(interpreter.scheduler.is_empty());
        let promise = interpreter.global("p").unwrap();
        assert_eq!(interpreter.await_value(promise).unwrap(), Value::Whole(42));
    }

    #[test]
    fn test_parked_tasks_resume_in_order() {
        let source = "\
log as List[Text] is []
Task nothing:
    output
Task first:
    await nothing()
    log.append(\"first\")
Task second:
    await nothing()
    log.append(\"second\")
p2 as Promise is second()
p1 as Promise is first()
";
        let mut interpreter = Interpreter::new(Config::default().with_drain_tasks(false));
        interpreter.interpret(&program(source)).unwrap();
        assert_eq!(interpreter.scheduler.len(), 2);
        assert_eq!(interpreter.global("log").unwrap().to_string(), "[]");

        interpreter.drain_tasks();
        assert!(interpreter.scheduler.is_empty());
        let log = interpreter.global("log").unwrap();
        assert_eq!(log.to_string(), "[\"second\", \"first\"]");
    }

    #[test]
    fn test_await_rejects_non_promise() {
        let mut interpreter = Interpreter::new(Config::default());
        let err = interpreter.await_value(Value::Whole(1)).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Type);
    }
}
