//! Object types
//!
//! Every `Object` declaration becomes a descriptor in the registry. Lookups
//! (ancestry checks, methods, field types, constructors) walk the parent
//! chain from the concrete type upwards and the first match wins.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Constructor, FieldDecl, ObjectDecl};
use crate::environment::{Env, Environment};
use crate::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::token::Span;
use crate::types::Type;
use crate::value::Function;

/// Root of every error type
pub const ERROR_TYPE: &str = "Error";

/// Descriptor of a declared Object type
pub struct ObjectType {
    pub name: String,
    pub parent: Option<String>,
    pub fields: Vec<FieldDecl>,
    pub constructors: Vec<Rc<Constructor>>,
    pub methods: HashMap<String, Rc<Function>>,
    /// Scope the declaration was evaluated in
    pub closure: Env,
}

/// All Object types known to an interpreter
#[derive(Default)]
pub struct ObjectRegistry {
    types: HashMap<String, Rc<ObjectType>>,
}

impl ObjectRegistry {
    /// Registry holding `Error` and the built-in error types
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();

        let field = |name: &str, ty: Type| FieldDecl {
            name: name.to_string(),
            ty,
            init: None,
            span: Span::default(),
        };
        registry.insert(ObjectType {
            name: ERROR_TYPE.to_string(),
            parent: None,
            fields: vec![field("message", Type::Text), field("payload", Type::Any)],
            constructors: Vec::new(),
            methods: HashMap::new(),
            closure: Rc::new(RefCell::new(Environment::new())),
        });

        for name in RuntimeErrorKind::BUILTIN {
            registry.declare_plain(name, Some(ERROR_TYPE));
        }

        registry
    }

    fn insert(&mut self, object: ObjectType) {
        self.types.insert(object.name.clone(), Rc::new(object));
    }

    /// Register a declaration evaluated in `closure`
    pub fn declare(&mut self, decl: &ObjectDecl, closure: &Env) -> RuntimeResult<()> {
        if let Some(parent) = &decl.parent {
            if parent == &decl.name || self.is_a(parent, &decl.name) {
                return Err(RuntimeError::type_error(format!(
                    "{} cannot inherit from itself",
                    decl.name
                )));
            }
            if !self.contains(parent) {
                return Err(RuntimeError::name_error(parent));
            }
        }

        let methods = decl
            .methods
            .iter()
            .map(|method| {
                let function = Function {
                    decl: Rc::clone(method),
                    closure: Rc::clone(closure),
                };
                (method.name.clone(), Rc::new(function))
            })
            .collect();

        self.insert(ObjectType {
            name: decl.name.clone(),
            parent: decl.parent.clone(),
            fields: decl.fields.clone(),
            constructors: decl.constructors.clone(),
            methods,
            closure: Rc::clone(closure),
        });

        Ok(())
    }

    /// Register a type with no members, such as an error type first seen in `raise`
    pub fn declare_plain(&mut self, name: &str, parent: Option<&str>) {
        self.insert(ObjectType {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: HashMap::new(),
            closure: Rc::new(RefCell::new(Environment::new())),
        });
    }

    pub fn get(&self, name: &str) -> Option<Rc<ObjectType>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// `type_name` followed by its ancestors, nearest first
    fn chain<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Rc<ObjectType>> + 'a {
        let mut next = self.types.get(type_name);
        let mut remaining = self.types.len();
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let current = next?;
            next = current.parent.as_deref().and_then(|p| self.types.get(p));
            Some(current)
        })
    }

    /// Whether `type_name` is `ancestor` or inherits from it
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        type_name == ancestor || self.chain(type_name).any(|t| t.name == ancestor)
    }

    /// Descriptors from the root ancestor down to `type_name`
    pub fn ancestry(&self, type_name: &str) -> Vec<Rc<ObjectType>> {
        let mut chain: Vec<_> = self.chain(type_name).cloned().collect();
        chain.reverse();
        chain
    }

    /// Nearest method named `name`, starting at the receiver's own type
    pub fn find_method(&self, type_name: &str, name: &str) -> Option<Rc<Function>> {
        self.chain(type_name).find_map(|t| t.methods.get(name).cloned())
    }

    /// Declared type of a field, searching ancestors
    pub fn field_type(&self, type_name: &str, field: &str) -> Option<Type> {
        self.chain(type_name)
            .find_map(|t| t.fields.iter().find(|f| f.name == field).map(|f| f.ty.clone()))
    }

    /// The nearest type in the chain that declares constructors
    pub fn constructor_owner(&self, type_name: &str) -> Option<Rc<ObjectType>> {
        self.chain(type_name).find(|t| !t.constructors.is_empty()).cloned()
    }
}

/// Pick a constructor for `argc` arguments: an exact-arity `build` first,
/// then the first `build defaults` that can take that many arguments.
pub fn select_constructor(constructors: &[Rc<Constructor>], argc: usize) -> Option<&Rc<Constructor>> {
    constructors
        .iter()
        .find(|c| !c.defaults && c.params.len() == argc)
        .or_else(|| constructors.iter().find(|c| c.defaults && argc <= c.params.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Stmt;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn registry_from(source: &str) -> ObjectRegistry {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let env: Env = Rc::new(RefCell::new(Environment::new()));
        let mut registry = ObjectRegistry::with_builtins();
        for stmt in program.statements.iter() {
            if let Stmt::Object(decl) = stmt {
                registry.declare(decl, &env).unwrap();
            }
        }
        registry
    }

    const SHAPES: &str = "\
Object Shape:
    name as Text is \"shape\"
    build:
        my name is \"shape\"
    Job describe returning Text:
        output \"a shape\"
    Job area returning Whole:
        output 0
Object Square inherits Shape:
    side as Whole
    Job area returning Whole:
        output my side * my side
Object Tiny inherits Square
";

    #[test]
    fn test_ancestry() {
        let registry = registry_from(SHAPES);
        assert!(registry.is_a("Tiny", "Shape"));
        assert!(registry.is_a("Square", "Square"));
        assert!(!registry.is_a("Shape", "Square"));
        let names: Vec<_> = registry.ancestry("Tiny").iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["Shape", "Square", "Tiny"]);
    }

    #[test]
    fn test_nearest_method_wins() {
        let registry = registry_from(SHAPES);
        let area = registry.find_method("Tiny", "area").unwrap();
        let square_area = registry.get("Square").unwrap().methods["area"].clone();
        assert!(Rc::ptr_eq(&area, &square_area));
        assert!(registry.find_method("Tiny", "describe").is_some());
        assert!(registry.find_method("Tiny", "missing").is_none());
    }

    #[test]
    fn test_fields_and_constructors_are_inherited() {
        let registry = registry_from(SHAPES);
        assert_eq!(registry.field_type("Tiny", "name"), Some(Type::Text));
        assert_eq!(registry.field_type("Tiny", "side"), Some(Type::Whole));
        assert_eq!(registry.constructor_owner("Tiny").unwrap().name, "Shape");
    }

    #[test]
    fn test_builtin_errors_inherit_error() {
        let registry = ObjectRegistry::with_builtins();
        for name in RuntimeErrorKind::BUILTIN {
            assert!(registry.is_a(name, ERROR_TYPE));
        }
    }

    #[test]
    fn test_unknown_parent() {
        let tokens = Lexer::new("Object A inherits Missing\n").tokenize().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let env: Env = Rc::new(RefCell::new(Environment::new()));
        let Stmt::Object(decl) = &program.statements[0] else { panic!("expected object") };
        let err = ObjectRegistry::with_builtins().declare(decl, &env).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::Name);
    }
}
