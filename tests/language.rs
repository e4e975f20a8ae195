use quill::compile::Pipeline;
use quill::infra::{QuillError, format_float};
use quill::interp::error::{ErrorKind, RuntimeError};

fn output(src: &str) -> String {
    let execution = quill::run(src);

    assert!(execution.is_success(), "{src:?} failed: {:?}", execution.error());
    execution.output
}

fn runtime_error(src: &str) -> RuntimeError {
    match quill::run(src).result {
        Err(QuillError::RuntimeError(err)) => err.error,
        other => panic!("expected a runtime error from {src:?}, got {other:?}"),
    }
}

#[test]
fn arithmetic_on_literals() {
    let pairs = [(10, 20), (7, 3), (0, 5), (123, 1), (9, 9)];

    for (a, b) in pairs {
        assert_eq!(output(&format!("print({a} + {b})")), format!("{}\n", a + b));
        assert_eq!(output(&format!("print({a} - {b})")), format!("{}\n", a - b));
        assert_eq!(output(&format!("print({a} * {b})")), format!("{}\n", a * b));
        assert_eq!(
            output(&format!("print({a} / {b})")),
            format!("{}\n", format_float(a as f64 / b as f64))
        );
    }

    assert_eq!(output("print(1.5 + 2)"), "3.5\n");
}

#[test]
fn division_by_zero_is_an_arithmetic_error() {
    let err = runtime_error("print(1 / 0)");

    assert_eq!(err, RuntimeError::DivisionByZero);
    assert_eq!(err.kind(), ErrorKind::Arithmetic);
    assert_eq!(runtime_error("x = 0\nprint(5 % x)").kind(), ErrorKind::Arithmetic);
}

#[test]
fn while_loop_counts_up() {
    assert_eq!(output("x = 1\nwhile x < 5:\n x = x + 1\nprint(x)"), "5\n");
}

#[test]
fn functions_return_values() {
    assert_eq!(output("def add(a, b):\n return a + b\nprint(add(2,3))"), "5\n");
}

#[test]
fn functions_see_only_their_parameters() {
    let err = runtime_error("y = 1\ndef f():\n    return y\nprint(f())");

    assert_eq!(err, RuntimeError::UndefinedVariable { name: "y".into() });
}

#[test]
fn break_outside_loop_is_a_control_flow_error() {
    assert_eq!(runtime_error("break").kind(), ErrorKind::ControlFlow);
    assert_eq!(runtime_error("continue").kind(), ErrorKind::ControlFlow);
}

#[test]
fn indexing_lists() {
    assert_eq!(output("a = [1,2,3]\nprint(a[1])"), "2\n");
    assert!(matches!(
        runtime_error("a = [1,2,3]\nprint(a[5])"),
        RuntimeError::IndexOutOfRange { index: 5, len: 3 }
    ));
}

#[test]
fn output_before_a_failure_is_kept() {
    let execution = quill::run("print(1)\nprint(x)\nprint(2)");

    assert_eq!(execution.output, "1\n");
    assert!(!execution.is_success());
}

#[test]
fn try_except_recovers_and_records_the_error() {
    let execution = quill::run("try:\n    print(1 / 0)\nexcept:\n    print(\"handled\")");

    assert_eq!(execution.output, "handled\n");
    assert_eq!(execution.caught.len(), 1);
    assert_eq!(execution.diagnostics().len(), 1);
}

#[test]
fn loops_and_strings() {
    let src = "total = 0\nfor i in range(1, 4):\n    total = total + i\nprint(total)\n\
               for c in \"ab\":\n    print(c.upper())";

    assert_eq!(output(src), "6\nA\nB\n");
}

#[test]
fn lists_are_shared() {
    assert_eq!(output("a = [1]\nb = a\nb[0] = 9\nprint(a[0])"), "9\n");
}

#[test]
fn a_list_can_contain_itself() {
    let execution = quill::run("a = [1]\na[0] = a\nprint(a)\nprint(a == [a])");

    assert_eq!(execution.output, "[[...]]\nTrue\n");
}

#[test]
fn unterminated_strings_are_reported_by_the_lexer() {
    let execution = quill::run("print(\"abc)");

    assert!(matches!(execution.error(), Some(QuillError::SyntaxError(_))));
    assert_eq!(
        execution.diagnostics(),
        vec!["unterminated string literal at line 1, column 7".to_string()]
    );
}

#[test]
fn syntax_errors_carry_a_position() {
    let execution = quill::run("x = (1 +\nprint(x)");

    let Some(QuillError::SyntaxError(err)) = execution.error() else {
        panic!("expected a syntax error, got {:?}", execution.error());
    };
    assert!(err.line >= 1);
    assert!(err.to_string().contains("line"));
}

#[test]
fn call_depth_is_configurable() {
    let src = "def down(n):\n    if n == 0:\n        return 0\n    return down(n - 1)\nprint(down(50))";

    assert_eq!(output(src), "0\n");
    assert!(!Pipeline::new().max_call_depth(20).run(src).is_success());
}
