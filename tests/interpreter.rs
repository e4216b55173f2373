//! End-to-end tests driving the compiled binary exactly as a user would: write a script
//! to a file, run `embergrove <path>`, check stdout/exit code. These exercise scanner,
//! compiler and VM together, which the per-module `#[cfg(test)]` suites don't.

use std::io::Write;
use std::process::{Command, Output};

fn run_script(source: &str) -> Output {
    let mut path = std::env::temp_dir();
    path.push(format!("embergrove-test-{}.script", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).expect("create temp script");
        file.write_all(source.as_bytes()).expect("write temp script");
    }

    let output = Command::new(env!("CARGO_BIN_EXE_embergrove"))
        .arg(&path)
        .output()
        .expect("run interpreter binary");

    let _ = std::fs::remove_file(&path);
    output
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout).lines().map(str::to_string).collect()
}

#[test]
fn arithmetic_precedence() {
    let output = run_script("print 1 + 2 * 3;");
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["7"]);
}

#[test]
fn closures_capture_by_reference() {
    let output = run_script(
        "fun makeCounter(){var i=0; fun c(){i=i+1; return i;} return c;}
         var c = makeCounter(); print c(); print c(); print c();",
    );
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["1", "2", "3"]);
}

#[test]
fn shared_upvalue_identity() {
    let output = run_script(
        "fun outer(){var x=\"a\"; fun get(){return x;} fun set(v){x=v;}
           set(\"b\"); print get();}
         outer();",
    );
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["b"]);
}

#[test]
fn inheritance_and_super_call() {
    let output = run_script(
        "class A { greet(){print \"A\";} }
         class B < A { greet(){super.greet(); print \"B\";} }
         B().greet();",
    );
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["A", "B"]);
}

#[test]
fn initializer_returns_instance() {
    let output = run_script("class P{init(x){this.x=x;}} print P(7).x;");
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), vec!["7"]);
}

#[test]
fn runtime_error_produces_a_stack_trace_and_exit_70() {
    let output = run_script("fun a(){b();} fun b(){ nil.x; } a();");
    assert_eq!(output.status.code(), Some(70));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("in b"));
    assert!(stderr.contains("in a"));
    assert!(stderr.contains("in script"));
}

#[test]
fn compile_error_exits_65() {
    let output = run_script("var = ;");
    assert_eq!(output.status.code(), Some(65));
}

#[test]
fn missing_file_exits_74() {
    let output = Command::new(env!("CARGO_BIN_EXE_embergrove"))
        .arg("/nonexistent/path/does-not-exist.script")
        .output()
        .expect("run interpreter binary");
    assert_eq!(output.status.code(), Some(74));
}

#[test]
fn too_many_arguments_exits_64() {
    let output = Command::new(env!("CARGO_BIN_EXE_embergrove"))
        .arg("one")
        .arg("two")
        .output()
        .expect("run interpreter binary");
    assert_eq!(output.status.code(), Some(64));
}
