//! Integration tests for raise, do/fail/always and error reporting

use nair8::{run, Error, RuntimeErrorKind};

fn outputs(source: &str) -> Vec<String> {
    let execution = run(source).expect("parse failed");
    if let Some(error) = execution.error {
        panic!("runtime error: {}", error);
    }
    execution.outputs
}

#[test]
fn test_first_matching_handler_by_ancestry() {
    let source = r#"
Object E3 inherits Error
Object E2 inherits Error
Object E1 inherits E3
do:
    raise "boom" as E1
fail e as E2:
    show "E2 {e.message}"
fail e as E3:
    show "E3 {e.message}"
always:
    show "always"
"#;
    assert_eq!(outputs(source), vec!["E3 boom", "always"]);
}

#[test]
fn test_unmatched_error_propagates_after_always() {
    let source = r#"
do:
    raise "bad" as Oops
fail e as KeyError:
    show "wrong handler"
always:
    show "always"
show "unreachable"
"#;
    let execution = run(source).unwrap();
    assert_eq!(execution.outputs, vec!["always"]);
    let error = execution.error.expect("expected an error");
    assert_eq!(error.type_name(), "Oops");
    assert_eq!(error.message, "bad");
}

#[test]
fn test_error_in_handler_still_runs_always() {
    let source = r#"
do:
    raise "first" as First
fail e as First:
    show "handling {e.message}"
    raise "second" as Second
always:
    show "always"
"#;
    let execution = run(source).unwrap();
    assert_eq!(execution.outputs, vec!["handling first", "always"]);
    assert_eq!(execution.error.unwrap().type_name(), "Second");
}

#[test]
fn test_error_in_always_replaces_pending_error() {
    let source = r#"
do:
    raise "first" as First
always:
    raise "second" as Second
"#;
    let error = run(source).unwrap().error.expect("expected an error");
    assert_eq!(error.type_name(), "Second");
}

#[test]
fn test_output_inside_do_runs_always_first() {
    let source = r#"
Job f returning Whole:
    do:
        output 1
    always:
        show "cleanup"
    output 2
show f()
"#;
    assert_eq!(outputs(source), vec!["cleanup", "1"]);
}

#[test]
fn test_builtin_errors_are_catchable() {
    let source = r#"
do:
    show 10 / 0
fail e as DivideByZeroError:
    show e.message
"#;
    assert_eq!(outputs(source), vec!["division by zero"]);
}

#[test]
fn test_catch_all_from_nested_calls() {
    let source = r#"
Job inner requires v as Any:
    x as Whole is v
Job outer:
    inner("nope")
    show "not reached"
do:
    outer()
fail e as Error:
    match e:
        when TypeError: show "type error caught"
        or: show "something else"
show "after"
"#;
    assert_eq!(outputs(source), vec!["type error caught", "after"]);
}

#[test]
fn test_raise_carries_payload() {
    let source = r#"
do:
    raise 42 as Code
fail e as Code:
    show e.payload + 1
"#;
    assert_eq!(outputs(source), vec!["43"]);
}

#[test]
fn test_raising_builtin_error_type() {
    let error = run("raise \"manual\" as KeyError\n").unwrap().error.unwrap();
    assert_eq!(error.kind, RuntimeErrorKind::Key);
}

#[test]
fn test_handlers_are_skipped_without_error() {
    let source = r#"
do:
    show "fine"
fail e as Error:
    show "not reached"
show "done"
"#;
    assert_eq!(outputs(source), vec!["fine", "done"]);
}

#[test]
fn test_diagnostic_shows_line() {
    let source = "x as Whole is 1\nshow x / 0\n";
    let error = run(source).unwrap().error.expect("expected an error");
    assert_eq!(error.span.map(|span| span.line), Some(2));

    let diagnostic = Error::from(error).with_source(source).to_string();
    assert!(diagnostic.starts_with("[line 2:"));
    assert!(diagnostic.contains("DivideByZeroError"));
    assert!(diagnostic.contains("show x / 0"));
}
