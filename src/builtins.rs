//! Built-in members of Text, List, Mapping, Stream and Promise values
//!
//! Reading a member without calling it (`xs.length`, `s.done`) is the same
//! as calling it with no arguments.

use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::interpreter::{no_member, Interpreter};
use crate::machine::StreamStep;
use crate::types;
use crate::value::{StreamState, Value};

impl Interpreter {
    pub(crate) fn call_builtin(&mut self, receiver: Value, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        match &receiver {
            Value::Text(text) => match name {
                "length" => {
                    expect_args(name, &args, 0)?;
                    Ok(Value::Whole(text.chars().count() as i64))
                }
                "upper" => {
                    expect_args(name, &args, 0)?;
                    Ok(Value::text(&text.to_uppercase()))
                }
                "lower" => {
                    expect_args(name, &args, 0)?;
                    Ok(Value::text(&text.to_lowercase()))
                }
                "contains" => {
                    expect_args(name, &args, 1)?;
                    match &args[0] {
                        Value::Text(part) => Ok(Value::Truth(text.contains(&**part))),
                        other => Err(RuntimeError::type_error(format!(
                            "contains expects Text, got {}",
                            other.kind_name()
                        ))),
                    }
                }
                _ => Err(no_member("Text", name)),
            },

            Value::List(list) => match name {
                "length" => {
                    expect_args(name, &args, 0)?;
                    Ok(Value::Whole(list.borrow().items.len() as i64))
                }
                "append" => {
                    expect_args(name, &args, 1)?;
                    let elem = list.borrow().elem.clone();
                    let mut args = args;
                    let item = args.remove(0);
                    types::expect_type(&elem, &item, "append", &self.objects)?;
                    list.borrow_mut().items.push(item);
                    Ok(Value::Void)
                }
                "insert" => {
                    expect_args(name, &args, 2)?;
                    let mut args = args.into_iter();
                    let (index, item) = match (args.next(), args.next()) {
                        (Some(Value::Whole(index)), Some(item)) => (index, item),
                        _ => return Err(RuntimeError::type_error("insert expects a Whole position")),
                    };
                    let elem = list.borrow().elem.clone();
                    types::expect_type(&elem, &item, "insert", &self.objects)?;
                    let mut list = list.borrow_mut();
                    let position = usize::try_from(index)
                        .ok()
                        .filter(|&i| i <= list.items.len())
                        .ok_or_else(|| {
                            RuntimeError::new(
                                RuntimeErrorKind::Index,
                                format!("insert position {} out of range", index),
                            )
                        })?;
                    list.items.insert(position, item);
                    Ok(Value::Void)
                }
                "contains" => {
                    expect_args(name, &args, 1)?;
                    Ok(Value::Truth(list.borrow().items.contains(&args[0])))
                }
                _ => Err(no_member("List", name)),
            },

            Value::Mapping(map) => match name {
                "length" => {
                    expect_args(name, &args, 0)?;
                    Ok(Value::Whole(map.borrow().entries.len() as i64))
                }
                "insert" => {
                    expect_args(name, &args, 2)?;
                    let mut args = args.into_iter();
                    let (Some(key), Some(value)) = (args.next(), args.next()) else {
                        return Err(RuntimeError::arity(name, 2, 0));
                    };
                    let (key_type, value_type) = {
                        let map = map.borrow();
                        (map.key.clone(), map.value.clone())
                    };
                    types::expect_type(&key_type, &key, "mapping key", &self.objects)?;
                    types::expect_type(&value_type, &value, "mapping value", &self.objects)?;
                    map.borrow_mut().insert(key, value);
                    Ok(Value::Void)
                }
                "get" => {
                    expect_args(name, &args, 1)?;
                    let found = map.borrow().get(&args[0]).cloned();
                    found.ok_or_else(|| {
                        RuntimeError::new(
                            RuntimeErrorKind::Key,
                            format!("key {} not found", args[0].repr()),
                        )
                    })
                }
                "has" => {
                    expect_args(name, &args, 1)?;
                    Ok(Value::Truth(map.borrow().get(&args[0]).is_some()))
                }
                "keys" => {
                    expect_args(name, &args, 0)?;
                    let map = map.borrow();
                    let keys = map.entries.iter().map(|(k, _)| k.clone()).collect();
                    Ok(Value::list(map.key.clone(), keys))
                }
                "values" => {
                    expect_args(name, &args, 0)?;
                    let map = map.borrow();
                    let values = map.entries.iter().map(|(_, v)| v.clone()).collect();
                    Ok(Value::list(map.value.clone(), values))
                }
                _ => Err(no_member("Mapping", name)),
            },

            Value::Stream(stream) => match name {
                "next" => {
                    expect_args(name, &args, 0)?;
                    match self.resume_stream(&receiver)? {
                        StreamStep::Emitted(value) | StreamStep::Finished(value) => Ok(value),
                    }
                }
                "state" => {
                    expect_args(name, &args, 0)?;
                    Ok(Value::text(stream.borrow().state.label()))
                }
                "done" => {
                    expect_args(name, &args, 0)?;
                    let done = matches!(stream.borrow().state, StreamState::Exhausted);
                    Ok(Value::Truth(done))
                }
                _ => Err(no_member("Stream", name)),
            },

            Value::Promise(promise) => match name {
                "state" => {
                    expect_args(name, &args, 0)?;
                    Ok(Value::text(promise.borrow().state.label()))
                }
                "done" => {
                    expect_args(name, &args, 0)?;
                    Ok(Value::Truth(promise.borrow().state.is_settled()))
                }
                _ => Err(no_member("Promise", name)),
            },

            other => Err(no_member(&other.kind_name(), name)),
        }
    }
}

fn expect_args(name: &str, args: &[Value], expected: usize) -> RuntimeResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::arity(name, expected, args.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use crate::value::MappingValue;

    #[test]
    fn test_text_members() {
        let mut interpreter = Interpreter::default();
        let text = Value::text("Hello");
        assert_eq!(interpreter.call_builtin(text.clone(), "length", vec![]).unwrap(), Value::Whole(5));
        assert_eq!(interpreter.call_builtin(text.clone(), "upper", vec![]).unwrap(), Value::text("HELLO"));
        assert_eq!(
            interpreter.call_builtin(text, "contains", vec![Value::text("ell")]).unwrap(),
            Value::Truth(true)
        );
    }

    #[test]
    fn test_append_checks_adopted_tag() {
        let mut interpreter = Interpreter::default();
        let list = Value::list(Type::Whole, vec![Value::Whole(1)]);
        interpreter.call_builtin(list.clone(), "append", vec![Value::Whole(2)]).unwrap();
        let err = interpreter
            .call_builtin(list.clone(), "append", vec![Value::text("three")])
            .unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Type);
        assert_eq!(list.to_string(), "[1, 2]");
    }

    #[test]
    fn test_mapping_get_missing_key() {
        let mut interpreter = Interpreter::default();
        let map = Value::Mapping(MappingValue::shared(Type::Text, Type::Whole, Vec::new()));
        interpreter
            .call_builtin(map.clone(), "insert", vec![Value::text("a"), Value::Whole(1)])
            .unwrap();
        assert_eq!(interpreter.call_builtin(map.clone(), "get", vec![Value::text("a")]).unwrap(), Value::Whole(1));
        let err = interpreter.call_builtin(map, "get", vec![Value::text("b")]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Key);
    }

    #[test]
    fn test_unknown_member() {
        let mut interpreter = Interpreter::default();
        let err = interpreter.call_builtin(Value::Whole(1), "length", vec![]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Name);
    }
}
