//! Integration tests for Tasks, Promises and await

use nair8::{evaluate_with, parse, run, Config, RuntimeErrorKind};

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

#[test]
fn test_await_settles_promise() {
    let source = r#"
Task nothing:
    output
Task compute returning Whole:
    await nothing()
    output 40
p as Promise[Whole] is compute()
show p.state
show await p
show p.state
show p.done
"#;
    assert_eq!(outputs(source), vec!["Pending", "40", "Fulfilled", "true"]);
}

#[test]
fn test_task_body_runs_on_call() {
    let source = r#"
Task t:
    show "in t"
    output 1
p as Promise is t()
show "after"
show p.state
"#;
    assert_eq!(outputs(source), vec!["in t", "after", "Fulfilled"]);
}

#[test]
fn test_task_runs_until_first_await() {
    let source = r#"
Task nothing:
    output
Task greet:
    show "start"
    await nothing()
    show "end"
p as Promise is greet()
show "main"
show p.state
await p
show p.state
"#;
    assert_eq!(outputs(source), vec!["start", "main", "Pending", "end", "Fulfilled"]);
}

#[test]
fn test_task_arguments() {
    let source = r#"
Task double requires n as Whole returning Whole:
    output n * 2
show await double(21)
"#;
    assert_eq!(outputs(source), vec!["42"]);
}

#[test]
fn test_tasks_run_in_call_order() {
    let source = r#"
log as List[Text] is []
Task a:
    log.append("a")
Task b:
    log.append("b")
pa as Promise is a()
pb as Promise is b()
await pb
show log
show pa.state
"#;
    assert_eq!(outputs(source), vec!["[\"a\", \"b\"]", "Fulfilled"]);
}

#[test]
fn test_failed_task_raises_at_await() {
    let source = r#"
Task failing returning Whole:
    raise "nope" as TaskBroke
p as Promise is failing()
do:
    show await p
fail e as TaskBroke:
    show "caught {e.message}"
show p.state
"#;
    assert_eq!(outputs(source), vec!["caught nope", "Failed"]);
}

#[test]
fn test_awaiting_twice_gives_same_value() {
    let source = r#"
Task once returning Text:
    show "ran"
    output "done"
p as Promise is once()
show await p
show await p
"#;
    assert_eq!(outputs(source), vec!["ran", "done", "done"]);
}

#[test]
fn test_await_requires_promise() {
    assert_eq!(error_kind("show await 5\n"), RuntimeErrorKind::Type);
}

#[test]
fn test_self_await_is_reentrant() {
    let source = r#"
Task selfish:
    await p
p as Promise is selfish()
await p
"#;
    assert_eq!(error_kind(source), RuntimeErrorKind::Reentrancy);
}

#[test]
fn test_task_output_is_type_checked() {
    let source = r#"
Task wrong returning Whole:
    output "text"
await wrong()
"#;
    assert_eq!(error_kind(source), RuntimeErrorKind::Type);
}

#[test]
fn test_parked_tasks_drain_after_program() {
    let source = r#"
Task nothing:
    output
Task greet:
    show "start"
    await nothing()
    show "end"
greet()
show "main"
"#;
    assert_eq!(outputs(source), vec!["start", "main", "end"]);

    let program = parse(source).unwrap();
    let execution = evaluate_with(&program, Config::default().with_drain_tasks(false));
    assert!(execution.is_ok());
    assert_eq!(execution.outputs, vec!["start", "main"]);
}
