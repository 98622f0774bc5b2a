//! Integration tests for Objects, inheritance and construction

use nair8::{run, RuntimeErrorKind};

fn outputs(source: &str) -> Vec<String> {
    let execution = run(source).expect("parse failed");
    if let Some(error) = execution.error {
        panic!("runtime error: {}", error);
    }
    execution.outputs
}

fn error_kind(source: &str) -> RuntimeErrorKind {
    run(source)
        .expect("parse failed")
        .error
        .expect("expected a runtime error")
        .kind
}

const ANIMALS: &str = r#"
Object Animal:
    name as Text
    legs as Whole is 4
    build requires name as Text:
        my name is name
    Job speak returning Text:
        output "..."
    Job describe returning Text:
        output "{my name} says {my speak()}"

Object Dog inherits Animal:
    Job speak returning Text:
        output "Woof"

Object Puppy inherits Dog
"#;

#[test]
fn test_construction_and_fields() {
    let source = format!("{}a as Animal is new Animal using \"Generic\"\nshow a.name\nshow a.legs\n", ANIMALS);
    assert_eq!(outputs(&source), vec!["Generic", "4"]);
}

#[test]
fn test_override_wins_from_ancestor_method() {
    let source = format!("{}d as Animal is new Dog using \"Rex\"\nshow d.describe()\n", ANIMALS);
    assert_eq!(outputs(&source), vec!["Rex says Woof"]);
}

#[test]
fn test_grandchild_inherits_constructor_and_methods() {
    let source = format!("{}p as Dog is new Puppy(\"Bit\")\nshow p.describe()\nshow p\n", ANIMALS);
    assert_eq!(
        outputs(&source),
        vec!["Bit says Woof", "Puppy(name: \"Bit\", legs: 4)"]
    );
}

#[test]
fn test_types_are_nominal() {
    let source = format!("{}d as Dog is new Animal using \"Cat\"\n", ANIMALS);
    assert_eq!(error_kind(&source), RuntimeErrorKind::Type);
}

#[test]
fn test_field_assignment_is_checked() {
    let wrong_type = format!("{}d as Dog is new Dog using \"Rex\"\nd.legs is \"four\"\n", ANIMALS);
    assert_eq!(error_kind(&wrong_type), RuntimeErrorKind::Type);

    let unknown = format!("{}d as Dog is new Dog using \"Rex\"\nd.age is 3\n", ANIMALS);
    assert_eq!(error_kind(&unknown), RuntimeErrorKind::Name);
}

#[test]
fn test_constructor_arity() {
    let source = format!("{}d as Dog is new Dog\n", ANIMALS);
    assert_eq!(error_kind(&source), RuntimeErrorKind::Arity);

    assert_eq!(error_kind("Object Empty\ne as Empty is new Empty using 1\n"), RuntimeErrorKind::Arity);
}

#[test]
fn test_constructor_defaults() {
    let source = r#"
Object Point:
    x as Whole
    y as Whole
    build defaults x as Whole is 0, y as Whole is 0:
        my x is x
        my y is y
    Job sum returning Whole:
        output my x + my y

p as Point is new Point using 3
show p
show (new Point using 1, 2).sum()
show new Point
"#;
    assert_eq!(
        outputs(source),
        vec!["Point(x: 3, y: 0)", "3", "Point(x: 0, y: 0)"]
    );
}

#[test]
fn test_exact_constructor_preferred_over_defaults() {
    let source = r#"
Object Greeting:
    text as Text
    build defaults who is "world":
        my text is "hello {who}"
    build requires a as Text:
        my text is "exact {a}"

show (new Greeting using "ada").text
show (new Greeting).text
"#;
    assert_eq!(outputs(source), vec!["exact ada", "hello world"]);
}

#[test]
fn test_methods_mutate_shared_instance() {
    let source = r#"
Object Counter:
    count as Whole
    Job increment:
        my count is my count + 1

c as Counter is new Counter
alias as Counter is c
c.increment()
alias.increment()
show c.count
"#;
    assert_eq!(outputs(source), vec!["2"]);
}

#[test]
fn test_bound_method_value() {
    let source = r#"
Object Box:
    value as Whole is 7
    Job get returning Whole:
        output my value

b as Box is new Box
getter as Job is b.get
show getter()
"#;
    assert_eq!(outputs(source), vec!["7"]);
}

#[test]
fn test_match_on_object_ancestry() {
    let source = format!(
        "{}{}",
        ANIMALS,
        r#"
pet as Any is new Puppy using "Bit"
match pet:
    when Animal: show "an animal"
    or: show "something else"
"#
    );
    assert_eq!(outputs(&source), vec!["an animal"]);
}

#[test]
fn test_inheritance_errors() {
    assert_eq!(error_kind("Object A inherits Missing\n"), RuntimeErrorKind::Name);
    assert_eq!(error_kind("Object A inherits A\n"), RuntimeErrorKind::Type);
    assert_eq!(error_kind("x as Any is new Nowhere\n"), RuntimeErrorKind::Name);
}

#[test]
fn test_my_outside_methods() {
    assert_eq!(error_kind("show my name\n"), RuntimeErrorKind::Name);
}
