//! The nair8 type system
//!
//! Types are checked at binding boundaries: declarations, assignments, calls,
//! outputs and emitted values. Objects are nominal and an Object satisfies
//! every ancestor type.

use std::fmt;

use crate::ast::FunctionDecl;
use crate::error::{RuntimeError, RuntimeResult};
use crate::objects::ObjectRegistry;
use crate::value::{MappingValue, Value};

/// A declared or runtime type
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Whole,
    Decimal,
    Text,
    Truth,
    Void,
    Any,
    /// Any callable: functions and bound methods
    Job,
    List(Box<Type>),
    Mapping(Box<Type>, Box<Type>),
    Promise(Box<Type>),
    Stream(Box<Type>),
    /// A user or built-in Object type, by name
    Object(String),
}

impl Type {
    /// Resolve a non-generic type name
    pub fn from_name(name: &str) -> Type {
        match name {
            "Whole" => Type::Whole,
            "Decimal" => Type::Decimal,
            "Text" => Type::Text,
            "Truth" => Type::Truth,
            "Void" => Type::Void,
            "Any" => Type::Any,
            "Job" => Type::Job,
            "List" => Type::List(Box::new(Type::Any)),
            "Mapping" => Type::Mapping(Box::new(Type::Any), Box::new(Type::Any)),
            "Promise" => Type::Promise(Box::new(Type::Any)),
            "Stream" => Type::Stream(Box::new(Type::Any)),
            other => Type::Object(other.to_string()),
        }
    }

    /// Value held by a declaration without an initializer
    pub fn default_value(&self) -> Value {
        match self {
            Type::Whole => Value::Whole(0),
            Type::Decimal => Value::Decimal(0.0),
            Type::Text => Value::text(""),
            Type::Truth => Value::Truth(false),
            Type::List(elem) => Value::list((**elem).clone(), Vec::new()),
            Type::Mapping(key, value) => Value::Mapping(MappingValue::shared(
                (**key).clone(),
                (**value).clone(),
                Vec::new(),
            )),
            _ => Value::Void,
        }
    }

    /// True for `Any`
    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Whole => write!(f, "Whole"),
            Type::Decimal => write!(f, "Decimal"),
            Type::Text => write!(f, "Text"),
            Type::Truth => write!(f, "Truth"),
            Type::Void => write!(f, "Void"),
            Type::Any => write!(f, "Any"),
            Type::Job => write!(f, "Job"),
            Type::List(elem) => write!(f, "List[{}]", elem),
            Type::Mapping(key, value) => write!(f, "Mapping[{}, {}]", key, value),
            Type::Promise(inner) => write!(f, "Promise[{}]", inner),
            Type::Stream(inner) => write!(f, "Stream[{}]", inner),
            Type::Object(name) => write!(f, "{}", name),
        }
    }
}

/// The runtime type of a value
pub fn type_of(value: &Value) -> Type {
    match value {
        Value::Whole(_) => Type::Whole,
        Value::Decimal(_) => Type::Decimal,
        Value::Text(_) => Type::Text,
        Value::Truth(_) => Type::Truth,
        Value::Void => Type::Void,
        Value::List(list) => Type::List(Box::new(list.borrow().elem.clone())),
        Value::Mapping(map) => {
            let map = map.borrow();
            Type::Mapping(Box::new(map.key.clone()), Box::new(map.value.clone()))
        }
        Value::Object(object) => Type::Object(object.borrow().type_name.clone()),
        Value::Function(_) | Value::Method(_) => Type::Job,
        Value::Stream(stream) => Type::Stream(Box::new(stream.borrow().elem.clone())),
        Value::Promise(promise) => Type::Promise(Box::new(promise.borrow().result.clone())),
    }
}

/// Whether a collection tagged `tag` may be used where `declared` is expected
fn tag_compatible(declared: &Type, tag: &Type, objects: &ObjectRegistry) -> bool {
    match (declared, tag) {
        (Type::Any, _) | (_, Type::Any) => true,
        (Type::Object(want), Type::Object(have)) => objects.is_a(have, want),
        (Type::List(want), Type::List(have))
        | (Type::Promise(want), Type::Promise(have))
        | (Type::Stream(want), Type::Stream(have)) => tag_compatible(want, have, objects),
        (Type::Mapping(want_key, want_value), Type::Mapping(have_key, have_value)) => {
            tag_compatible(want_key, have_key, objects)
                && tag_compatible(want_value, have_value, objects)
        }
        (want, have) => want == have,
    }
}

/// Whether `value` may be stored in a binding declared as `declared`
pub fn is_assignable(declared: &Type, value: &Value, objects: &ObjectRegistry) -> bool {
    match (declared, value) {
        (Type::Any, _) => true,
        (Type::Whole, Value::Whole(_))
        | (Type::Decimal, Value::Decimal(_))
        | (Type::Text, Value::Text(_))
        | (Type::Truth, Value::Truth(_))
        | (Type::Void, Value::Void)
        | (Type::Job, Value::Function(_) | Value::Method(_)) => true,
        (Type::List(elem), Value::List(list)) => {
            let list = list.borrow();
            tag_compatible(elem, &list.elem, objects)
                && list.items.iter().all(|item| is_assignable(elem, item, objects))
        }
        (Type::Mapping(key, val), Value::Mapping(map)) => {
            let map = map.borrow();
            tag_compatible(key, &map.key, objects)
                && tag_compatible(val, &map.value, objects)
                && map.entries.iter().all(|(k, v)| {
                    is_assignable(key, k, objects) && is_assignable(val, v, objects)
                })
        }
        (Type::Promise(inner), Value::Promise(promise)) => {
            tag_compatible(inner, &promise.borrow().result, objects)
        }
        (Type::Stream(inner), Value::Stream(stream)) => {
            tag_compatible(inner, &stream.borrow().elem, objects)
        }
        (Type::Object(name), Value::Object(object)) => {
            objects.is_a(&object.borrow().type_name, name)
        }
        _ => false,
    }
}

/// Check a value against a declared type, naming `what` in the error
pub fn expect_type(
    declared: &Type,
    value: &Value,
    what: &str,
    objects: &ObjectRegistry,
) -> RuntimeResult<()> {
    if is_assignable(declared, value, objects) {
        Ok(())
    } else {
        Err(RuntimeError::type_error(format!(
            "{} expects {}, got {}",
            what,
            declared,
            type_of(value)
        )))
    }
}

/// Narrow the element tags of an untyped collection to the declared type.
/// Later insertions into the collection are checked against the new tags.
pub fn adopt_tags(declared: &Type, value: &Value) {
    match (declared, value) {
        (Type::List(elem), Value::List(list)) => {
            let mut list = list.borrow_mut();
            if list.elem.is_any() {
                list.elem = (**elem).clone();
            }
        }
        (Type::Mapping(key, val), Value::Mapping(map)) => {
            let mut map = map.borrow_mut();
            if map.key.is_any() {
                map.key = (**key).clone();
            }
            if map.value.is_any() {
                map.value = (**val).clone();
            }
        }
        _ => {}
    }
}

/// Validate arguments for a call: arity first, then each parameter type
pub fn check_call(decl: &FunctionDecl, args: &[Value], objects: &ObjectRegistry) -> RuntimeResult<()> {
    if args.len() != decl.params.len() {
        return Err(RuntimeError::arity(&decl.name, decl.params.len(), args.len()));
    }

    for (param, arg) in decl.params.iter().zip(args) {
        if !is_assignable(&param.ty, arg, objects) {
            return Err(RuntimeError::type_error(format!(
                "parameter '{}' of {} expects {}, got {}",
                param.name,
                decl.name,
                param.ty,
                type_of(arg)
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectValue;

    fn registry() -> ObjectRegistry {
        let mut objects = ObjectRegistry::with_builtins();
        objects.declare_plain("BaseEntity", None);
        objects.declare_plain("Person", Some("BaseEntity"));
        objects
    }

    #[test]
    fn test_scalars_are_exact() {
        let objects = registry();
        assert!(is_assignable(&Type::Whole, &Value::Whole(1), &objects));
        assert!(!is_assignable(&Type::Decimal, &Value::Whole(1), &objects));
        assert!(!is_assignable(&Type::Whole, &Value::text("1"), &objects));
        assert!(is_assignable(&Type::Any, &Value::text("1"), &objects));
    }

    #[test]
    fn test_list_elements_are_checked() {
        let objects = registry();
        let declared = Type::List(Box::new(Type::Whole));
        let good = Value::list(Type::Any, vec![Value::Whole(1), Value::Whole(2)]);
        let bad = Value::list(Type::Any, vec![Value::Whole(1), Value::text("two")]);
        assert!(is_assignable(&declared, &good, &objects));
        assert!(!is_assignable(&declared, &bad, &objects));
    }

    #[test]
    fn test_adopted_tag_blocks_other_declarations() {
        let objects = registry();
        let list = Value::list(Type::Any, Vec::new());
        adopt_tags(&Type::List(Box::new(Type::Whole)), &list);
        assert!(!is_assignable(&Type::List(Box::new(Type::Text)), &list, &objects));
        assert!(is_assignable(&Type::List(Box::new(Type::Any)), &list, &objects));
    }

    #[test]
    fn test_objects_satisfy_ancestors() {
        let objects = registry();
        let person = Value::Object(ObjectValue::shared("Person", Vec::new()));
        assert!(is_assignable(&Type::Object("BaseEntity".into()), &person, &objects));
        assert!(is_assignable(&Type::Object("Person".into()), &person, &objects));

        let base = Value::Object(ObjectValue::shared("BaseEntity", Vec::new()));
        assert!(!is_assignable(&Type::Object("Person".into()), &base, &objects));
    }

    #[test]
    fn test_error_types_inherit_error() {
        let objects = registry();
        let err = Value::Object(ObjectValue::shared("TypeError", Vec::new()));
        assert!(is_assignable(&Type::Object("Error".into()), &err, &objects));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Type::from_name("Truth"), Type::Truth);
        assert_eq!(Type::from_name("List"), Type::List(Box::new(Type::Any)));
        assert_eq!(Type::from_name("Person"), Type::Object("Person".into()));
        assert_eq!(
            Type::Mapping(Box::new(Type::Text), Box::new(Type::Whole)).to_string(),
            "Mapping[Text, Whole]"
        );
    }
}
