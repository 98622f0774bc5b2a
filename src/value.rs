//! Runtime values for nair8
//!
//! Scalars are copied; lists, mappings, objects, streams and promises are
//! shared handles, so a mutation through one binding is seen by all.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::environment::Env;
use crate::error::RuntimeError;
use crate::machine::Machine;
use crate::types::Type;

/// Runtime values
#[derive(Clone)]
pub enum Value {
    Whole(i64),
    Decimal(f64),
    Text(Rc<str>),
    Truth(bool),
    Void,
    List(Rc<RefCell<ListValue>>),
    Mapping(Rc<RefCell<MappingValue>>),
    Object(Rc<RefCell<ObjectValue>>),
    Function(Rc<Function>),
    Method(Rc<BoundMethod>),
    Stream(Rc<RefCell<StreamValue>>),
    Promise(Rc<RefCell<PromiseValue>>),
}

impl Value {
    pub fn text(s: &str) -> Value {
        Value::Text(Rc::from(s))
    }

    pub fn list(elem: Type, items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(ListValue { elem, items })))
    }

    /// Short name of the runtime variant, used in messages
    pub fn kind_name(&self) -> String {
        match self {
            Value::Object(object) => object.borrow().type_name.clone(),
            other => match crate::types::type_of(other) {
                Type::List(_) => "List".to_string(),
                Type::Mapping(..) => "Mapping".to_string(),
                Type::Stream(_) => "Stream".to_string(),
                Type::Promise(_) => "Promise".to_string(),
                ty => ty.to_string(),
            },
        }
    }

    /// Rendering used inside collections: Text is quoted
    pub fn repr(&self) -> String {
        match self {
            Value::Text(s) => format!("{:?}", &**s),
            other => other.to_string(),
        }
    }
}

/// Language equality: structural for scalars and collections, with Whole and
/// Decimal compared numerically; identity for everything else.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Whole(a), Value::Whole(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Whole(a), Value::Decimal(b)) | (Value::Decimal(b), Value::Whole(a)) => {
                (*a as f64) == *b
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Truth(a), Value::Truth(b)) => a == b,
            (Value::Void, Value::Void) => true,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().items == b.borrow().items
            }
            (Value::Mapping(a), Value::Mapping(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.entries.len() == b.entries.len()
                        && a.entries.iter().all(|(k, v)| b.get(k) == Some(v))
                }
            }
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Stream(a), Value::Stream(b)) => Rc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Whole(n) => write!(f, "{}", n),
            Value::Decimal(n) => {
                if n.is_finite() && n.fract() == 0.0 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => write!(f, "{}", s),
            Value::Truth(b) => write!(f, "{}", b),
            Value::Void => write!(f, "void"),
            Value::List(list) => {
                let items: Vec<String> = list.borrow().items.iter().map(Value::repr).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Mapping(map) => {
                let entries: Vec<String> = map
                    .borrow()
                    .entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Object(object) => {
                let object = object.borrow();
                let fields: Vec<String> = object
                    .fields
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value.repr()))
                    .collect();
                write!(f, "{}({})", object.type_name, fields.join(", "))
            }
            Value::Function(func) => write!(f, "<{} {}>", func.decl.kind, func.decl.name),
            Value::Method(method) => write!(
                f,
                "<{} {}.{}>",
                method.function.decl.kind,
                method.receiver.kind_name(),
                method.function.decl.name
            ),
            Value::Stream(stream) => {
                let stream = stream.borrow();
                write!(f, "<Stream {} {}>", stream.name, stream.state.label())
            }
            Value::Promise(promise) => {
                let promise = promise.borrow();
                match &promise.state {
                    PromiseState::Fulfilled(value) => {
                        write!(f, "<Promise {} fulfilled {}>", promise.name, value.repr())
                    }
                    state => write!(f, "<Promise {} {}>", promise.name, state.label()),
                }
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "Text({:?})", &**s),
            Value::Whole(n) => write!(f, "Whole({})", n),
            Value::Decimal(n) => write!(f, "Decimal({})", n),
            Value::Truth(b) => write!(f, "Truth({})", b),
            other => write!(f, "{}", other),
        }
    }
}

/// Items of a list plus the element type it has committed to
#[derive(Debug)]
pub struct ListValue {
    pub elem: Type,
    pub items: Vec<Value>,
}

/// Insertion-ordered mapping
#[derive(Debug)]
pub struct MappingValue {
    pub key: Type,
    pub value: Type,
    pub entries: Vec<(Value, Value)>,
}

impl MappingValue {
    pub fn shared(key: Type, value: Type, entries: Vec<(Value, Value)>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self { key, value, entries }))
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace, keeping the original position of an existing key
    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

/// An instance of an Object type
#[derive(Debug)]
pub struct ObjectValue {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl ObjectValue {
    pub fn shared(type_name: &str, fields: Vec<(String, Value)>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            type_name: type_name.to_string(),
            fields,
        }))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }
}

/// A declared function closed over its defining scope
pub struct Function {
    pub decl: Rc<FunctionDecl>,
    pub closure: Env,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.decl.kind, self.decl.name)
    }
}

/// A method looked up on an object but not called yet
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Rc<Function>,
}

/// A generator instance
pub struct StreamValue {
    pub name: String,
    /// Declared type of emitted values
    pub elem: Type,
    pub state: StreamState,
}

/// Lifecycle of a stream. The machine is taken out while the body runs,
/// which is how re-entrant resumption is detected.
pub enum StreamState {
    NotStarted(Machine),
    Suspended(Machine),
    Running,
    Exhausted,
}

impl StreamState {
    pub fn label(&self) -> &'static str {
        match self {
            StreamState::NotStarted(_) => "NotStarted",
            StreamState::Suspended(_) => "Suspended",
            StreamState::Running => "Running",
            StreamState::Exhausted => "Exhausted",
        }
    }
}

/// Result slot of a Task call
pub struct PromiseValue {
    pub name: String,
    /// Declared type of the fulfilled value
    pub result: Type,
    pub state: PromiseState,
}

#[derive(Debug)]
pub enum PromiseState {
    /// Parked on the scheduler at an `await`
    Pending,
    /// Its task is executing right now
    Running,
    Fulfilled(Value),
    Failed(RuntimeError),
}

impl PromiseState {
    pub fn label(&self) -> &'static str {
        match self {
            PromiseState::Pending => "Pending",
            PromiseState::Running => "Running",
            PromiseState::Fulfilled(_) => "Fulfilled",
            PromiseState::Failed(_) => "Failed",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, PromiseState::Fulfilled(_) | PromiseState::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Whole(5).to_string(), "5");
        assert_eq!(Value::Decimal(5.5).to_string(), "5.5");
        assert_eq!(Value::Decimal(2.0).to_string(), "2.0");
        assert_eq!(Value::Void.to_string(), "void");
        let list = Value::list(Type::Any, vec![Value::Whole(1), Value::text("a")]);
        assert_eq!(list.to_string(), "[1, \"a\"]");
    }

    #[test]
    fn test_numeric_equality_promotes() {
        assert_eq!(Value::Whole(2), Value::Decimal(2.0));
        assert_ne!(Value::Whole(2), Value::text("2"));
    }

    #[test]
    fn test_mapping_insert_keeps_order() {
        let map = MappingValue::shared(Type::Any, Type::Any, Vec::new());
        map.borrow_mut().insert(Value::text("b"), Value::Whole(1));
        map.borrow_mut().insert(Value::text("a"), Value::Whole(2));
        map.borrow_mut().insert(Value::text("b"), Value::Whole(3));
        assert_eq!(Value::Mapping(map).to_string(), "{\"b\": 3, \"a\": 2}");
    }

    #[test]
    fn test_objects_compare_by_identity() {
        let a = Value::Object(ObjectValue::shared("Point", Vec::new()));
        let b = Value::Object(ObjectValue::shared("Point", Vec::new()));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
