//! Variable environment for nair8
//!
//! Handles scoped variable storage. Every binding remembers the type it was
//! declared with so that later assignments can be checked against it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{RuntimeError, RuntimeResult};
use crate::types::Type;
use crate::value::Value;

/// Shared handle to a scope
pub type Env = Rc<RefCell<Environment>>;

/// A binding in the environment
#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    declared: Type,
}

/// Variable environment with lexical scoping
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Binding>,
    parent: Option<Env>,
}

impl Environment {
    /// Create a new global environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child environment with parent scope
    pub fn with_parent(parent: Env) -> Self {
        Self {
            values: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// A fresh shared scope whose parent is `parent`
    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Self::with_parent(Rc::clone(parent))))
    }

    /// Create (or shadow) a binding in this scope
    pub fn define(&mut self, name: impl Into<String>, value: Value, declared: Type) {
        self.values.insert(name.into(), Binding { value, declared });
    }

    /// Get a variable's value
    pub fn get(&self, name: &str) -> RuntimeResult<Value> {
        if let Some(binding) = self.values.get(name) {
            Ok(binding.value.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().get(name)
        } else {
            Err(RuntimeError::name_error(name))
        }
    }

    /// Declared type of the nearest binding named `name`
    pub fn declared_type(&self, name: &str) -> RuntimeResult<Type> {
        if let Some(binding) = self.values.get(name) {
            Ok(binding.declared.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().declared_type(name)
        } else {
            Err(RuntimeError::name_error(name))
        }
    }

    /// Assign to the nearest existing binding. Type checks are the caller's job.
    pub fn assign(&mut self, name: &str, value: Value) -> RuntimeResult<()> {
        if let Some(binding) = self.values.get_mut(name) {
            binding.value = value;
            Ok(())
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().assign(name, value)
        } else {
            Err(RuntimeError::name_error(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeErrorKind;

    fn global() -> Env {
        Rc::new(RefCell::new(Environment::new()))
    }

    #[test]
    fn test_lookup_walks_parents() {
        let outer = global();
        outer.borrow_mut().define("x", Value::Whole(1), Type::Whole);
        let inner = Environment::child(&outer);
        assert_eq!(inner.borrow().get("x").unwrap(), Value::Whole(1));
        assert_eq!(inner.borrow().declared_type("x").unwrap(), Type::Whole);
    }

    #[test]
    fn test_assign_updates_declaring_scope() {
        let outer = global();
        outer.borrow_mut().define("x", Value::Whole(1), Type::Any);
        let inner = Environment::child(&outer);
        inner.borrow_mut().assign("x", Value::text("now text")).unwrap();
        assert_eq!(outer.borrow().get("x").unwrap(), Value::text("now text"));
    }

    #[test]
    fn test_shadowing_does_not_touch_parent() {
        let outer = global();
        outer.borrow_mut().define("x", Value::Whole(1), Type::Whole);
        let inner = Environment::child(&outer);
        inner.borrow_mut().define("x", Value::Whole(2), Type::Whole);
        assert_eq!(outer.borrow().get("x").unwrap(), Value::Whole(1));
        assert_eq!(inner.borrow().get("x").unwrap(), Value::Whole(2));
    }

    #[test]
    fn test_unknown_name() {
        let env = global();
        let err = env.borrow_mut().assign("missing", Value::Void).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Name);
        assert!(env.borrow().get("missing").is_err());
    }
}
