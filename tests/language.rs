//! Integration tests for bindings, operators and control flow

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

#[test]
fn test_show_declared_value() {
    assert_eq!(outputs("x as Whole is 5\nshow x\n"), vec!["5"]);
}

#[test]
fn test_call_with_using() {
    let source = r#"
Job add requires a, b as Whole, Whole returning Whole:
    output a + b
show add using 2, 3
"#;
    assert_eq!(outputs(source), vec!["5"]);
}

#[test]
fn test_call_with_parentheses() {
    let source = r#"
Job add requires a as Whole, b as Whole returning Whole:
    output a + b
show add(20, 22)
"#;
    assert_eq!(outputs(source), vec!["42"]);
}

#[test]
fn test_numeric_promotion() {
    assert_eq!(outputs("show 2 + 3.5 == 5.5\n"), vec!["true"]);
    assert_eq!(outputs("show 7 / 2\nshow 7.0 / 2\n"), vec!["3", "3.5"]);
}

#[test]
fn test_division_by_zero() {
    assert_eq!(error_kind("show 5 / 0\n"), RuntimeErrorKind::DivideByZero);
    assert_eq!(error_kind("show 5 % 0\n"), RuntimeErrorKind::DivideByZero);
}

#[test]
fn test_whole_overflow() {
    let source = "big as Whole is 9223372036854775807\nshow big + 1\n";
    assert_eq!(error_kind(source), RuntimeErrorKind::Overflow);
}

#[test]
fn test_reassignment_is_type_checked() {
    let source = "Job give returning Any:\n    output \"one\"\nx as Whole is 1\nx is give()\n";
    assert_eq!(error_kind(source), RuntimeErrorKind::Type);
    let source = "Job give returning Any:\n    output 1\nx as Decimal is give()\n";
    assert_eq!(error_kind(source), RuntimeErrorKind::Type);
}

#[test]
fn test_certain_type_errors_are_rejected_before_running() {
    let err = run("show \"start\"\nwhen false:\n    x as Whole is \"a\"\n").unwrap_err();
    assert!(matches!(err, nair8::Error::Check(_)));
    assert_eq!(err.span().map(|span| span.line), Some(3));

    let err = run("x as Whole is 1\nx is \"one\"\n").unwrap_err();
    assert!(matches!(err, nair8::Error::Check(_)));

    let err = run("x as Decimal is 1\n").unwrap_err();
    assert!(matches!(err, nair8::Error::Check(_)));

    let err = run("t as Text is \"a\"\nshow t - 1\n").unwrap_err();
    assert!(matches!(err, nair8::Error::Check(_)));
    assert!(err.to_string().starts_with("TypeError: cannot apply '-' to Text and Whole"));
}

#[test]
fn test_any_accepts_everything() {
    let source = "x as Any is 1\nx is \"one\"\nshow x\nx is [1, 2]\nshow x\n";
    assert_eq!(outputs(source), vec!["one", "[1, 2]"]);
}

#[test]
fn test_uninitialized_defaults() {
    let source = "n as Whole\nd as Decimal\nt as Text\nok as Truth\nxs as List[Whole]\nshow n\nshow d\nshow t.length\nshow ok\nshow xs\n";
    assert_eq!(outputs(source), vec!["0", "0.0", "0", "false", "[]"]);
}

#[test]
fn test_interpolation() {
    let source = "name as Text is \"Ada\"\nage as Whole is 36\nshow \"{name} is {age + 1} next year\"\n";
    assert_eq!(outputs(source), vec!["Ada is 37 next year"]);
}

#[test]
fn test_when_ladder() {
    let source = r#"
n as Whole is 7
when n < 5: show "small"
or when n < 10: show "medium"
or: show "large"
"#;
    assert_eq!(outputs(source), vec!["medium"]);
}

#[test]
fn test_separate_whens_are_independent() {
    let source = r#"
n as Whole is 3
when n > 1:
    show "more than one"
when n > 2:
    show "more than two"
"#;
    assert_eq!(outputs(source), vec!["more than one", "more than two"]);
}

#[test]
fn test_condition_must_be_truth() {
    assert_eq!(error_kind("when 1: show \"yes\"\n"), RuntimeErrorKind::Type);
    assert_eq!(error_kind("show 1 and true\n"), RuntimeErrorKind::Type);
}

#[test]
fn test_logic_short_circuits() {
    let source = "show false and missing\nshow true or missing\nshow not false\n";
    assert_eq!(outputs(source), vec!["false", "true", "true"]);
}

#[test]
fn test_loop_while() {
    let source = r#"
i as Whole is 0
total as Whole is 0
loop while i < 5:
    i is i + 1
    total is total + i
show total
"#;
    assert_eq!(outputs(source), vec!["15"]);
}

#[test]
fn test_loop_each() {
    let source = r#"
loop each n in [1, 2, 3]:
    show n * n
ages as Mapping[Text, Whole] is {"ada": 36, "alan": 41}
loop each name in ages:
    show "{name}: {ages[name]}"
loop each c in "hi":
    show c
"#;
    assert_eq!(outputs(source), vec!["1", "4", "9", "ada: 36", "alan: 41", "h", "i"]);
}

#[test]
fn test_output_leaves_loops() {
    let source = r#"
Job first_even requires xs as List[Whole] returning Whole:
    loop each x in xs:
        when x % 2 == 0: output x
    output -1
show first_even using [3, 5, 8, 10]
show first_even using [1]
"#;
    assert_eq!(outputs(source), vec!["8", "-1"]);
}

#[test]
fn test_match_type_patterns() {
    let source = r#"
x as Any is "hi"
match x:
    when Whole: show "whole"
    when Text: show "text"
    or: show "other"
"#;
    assert_eq!(outputs(source), vec!["text"]);
}

#[test]
fn test_match_value_patterns() {
    let source = r#"
Job describe requires n as Whole returning Text:
    match n:
        when 0: output "zero"
        when 1: output "one"
        or: output "many"
show describe using 0
show describe using 5
"#;
    assert_eq!(outputs(source), vec!["zero", "many"]);
}

#[test]
fn test_collections() {
    let source = r#"
xs as List[Whole] is [1, 2]
xs.append(3)
xs[0] is 10
show xs
show xs.length
show [1] + [2]
scores as Mapping[Text, Whole] is {}
scores["a"] is 1
scores.insert("b", 2)
show scores
show scores.has("c")
"#;
    assert_eq!(
        outputs(source),
        vec!["[10, 2, 3]", "3", "[1, 2]", "{\"a\": 1, \"b\": 2}", "false"]
    );
}

#[test]
fn test_collection_tags_are_enforced() {
    assert_eq!(
        error_kind("xs as List[Whole] is [1, 2]\nxs.append(\"three\")\n"),
        RuntimeErrorKind::Type
    );
    assert_eq!(error_kind("xs as List[Whole] is [1, \"two\"]\n"), RuntimeErrorKind::Type);
    assert_eq!(error_kind("xs as List[Whole] is [1]\nshow xs[3]\n"), RuntimeErrorKind::Index);
    assert_eq!(error_kind("m as Mapping is {}\nshow m[\"k\"]\n"), RuntimeErrorKind::Key);
}

#[test]
fn test_call_errors() {
    let add = "Job add requires a as Whole, b as Whole returning Whole:\n    output a + b\n";
    assert_eq!(error_kind(&format!("{}add using 1\n", add)), RuntimeErrorKind::Arity);
    assert_eq!(error_kind(&format!("{}add using 1, \"2\"\n", add)), RuntimeErrorKind::Type);
    assert_eq!(error_kind("Job f returning Whole:\n    output \"x\"\nf()\n"), RuntimeErrorKind::Type);
    assert_eq!(error_kind("show missing\n"), RuntimeErrorKind::Name);
}

#[test]
fn test_falling_off_a_job_yields_void() {
    let source = "Job nothing:\n    x as Whole is 1\nshow nothing()\n";
    assert_eq!(outputs(source), vec!["void"]);
}

#[test]
fn test_top_level_output_stops_the_program() {
    let source = "show \"before\"\noutput\nshow \"after\"\n";
    assert_eq!(outputs(source), vec!["before"]);
}

#[test]
fn test_parse_errors_are_reported() {
    let err = run("x as Whole is\n").unwrap_err();
    assert!(matches!(err, nair8::Error::Parse(_)));

    let err = run("emit 1\n").unwrap_err();
    assert!(matches!(err, nair8::Error::Parse(_)));

    let err = run("when true:\n\tshow 1\n").unwrap_err();
    assert!(matches!(err, nair8::Error::Lex(_)));
}

const COUNT_DOWN: &str = "\
Job down requires n as Whole returning Whole:
    when n == 0:
        output 0
    output 1 + down(n - 1)
";

#[test]
fn test_recursion_up_to_default_call_depth() {
    // down(n) nests n + 1 calls
    assert_eq!(outputs(&format!("{}show down(198)\n", COUNT_DOWN)), vec!["198"]);
    assert_eq!(outputs(&format!("{}show down(199)\n", COUNT_DOWN)), vec!["199"]);
    assert_eq!(
        error_kind(&format!("{}show down(200)\n", COUNT_DOWN)),
        RuntimeErrorKind::StackOverflow
    );
}

#[test]
fn test_raised_call_depth_does_not_exhaust_native_stack() {
    let program = nair8::parse(&format!("{}show down(3000)\n", COUNT_DOWN)).unwrap();
    let config = nair8::Config::default().with_max_call_depth(5000);
    let execution = nair8::evaluate_with(&program, config);
    assert!(execution.is_ok());
    assert_eq!(execution.outputs, vec!["3000"]);
}
