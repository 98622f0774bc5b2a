use nair8::run;

fn outputs(source: &str) -> Vec<String> {
    let execution = run(source).expect("parse failed");
    if let Some(error) = execution.error {
        panic!("runtime error: {}", error);
    }
    execution.outputs
}

#[test]
fn test_basic_closure() {
    let source = r#"
x as Text is "global"
Job makeClosure returning Job:
    y as Text is "captured"
    Job inner returning Text:
        output "{x} {y}"
    output inner
closure as Job is makeClosure()
show closure()
"#;
    assert_eq!(outputs(source), vec!["global captured"]);
}

#[test]
fn test_counter_state() {
    let source = r#"
Job makeCounter returning Job:
    count as Whole is 0
    Job step returning Whole:
        count is count + 1
        output count
    output step
c1 as Job is makeCounter()
c2 as Job is makeCounter()
show c1()
show c1()
show c2()
"#;
    assert_eq!(outputs(source), vec!["1", "2", "1"]);
}

#[test]
fn test_captured_binding_keeps_its_type() {
    let source = r#"
Job makeSetter returning Job:
    value as Whole is 0
    Job set requires v as Any:
        value is v
    output set
setter as Job is makeSetter()
setter("text")
"#;
    let error = run(source).unwrap().error.expect("expected an error");
    assert_eq!(error.type_name(), "TypeError");
}

#[test]
fn test_closures_see_later_global_changes() {
    let source = r#"
greeting as Text is "hello"
Job greet returning Text:
    output greeting
greeting is "goodbye"
show greet()
"#;
    assert_eq!(outputs(source), vec!["goodbye"]);
}
