//! End-to-end checks on the compiled binary: flag handling, output
//! format, and exit codes.

use std::io::Write;
use std::process::Command;

fn rill() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rill"))
}

fn write_script(name: &str, source: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("rill-cli-{name}-{}.rl", std::process::id()));
    let mut file = std::fs::File::create(&path).expect("create temp script");
    file.write_all(source.as_bytes()).expect("write temp script");
    path
}

#[test]
fn test_run_file_with_vm_engine() {
    let script = write_script("vm", "let x = 40; x + 2");
    let output = rill()
        .arg("--file")
        .arg(&script)
        .output()
        .expect("run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "engine=vm, result=42");
    let _ = std::fs::remove_file(script);
}

#[test]
fn test_run_file_with_eval_engine() {
    let script = write_script("eval", "let x = 40; x + 2");
    let output = rill()
        .arg("--engine")
        .arg("eval")
        .arg("--file")
        .arg(&script)
        .output()
        .expect("run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "engine=eval, result=42");
    let _ = std::fs::remove_file(script);
}

#[test]
fn test_bench_flag_prints_duration() {
    let script = write_script("bench", "1 + 1");
    let output = rill()
        .arg("--file")
        .arg(&script)
        .arg("--bench")
        .output()
        .expect("run binary");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("engine=vm, result=2"));
    assert!(stdout.contains("duration="));
    let _ = std::fs::remove_file(script);
}

#[test]
fn test_missing_file_exits_nonzero() {
    let output = rill()
        .arg("--file")
        .arg("/no/such/rill/script.rl")
        .output()
        .expect("run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not read"));
}

#[test]
fn test_parse_errors_are_bulleted() {
    let script = write_script("parse-errors", "let x 5; let = 10;");
    let output = rill()
        .arg("--file")
        .arg(&script)
        .output()
        .expect("run binary");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let bullets: Vec<&str> = stdout
        .lines()
        .filter(|line| line.starts_with("\t- "))
        .collect();
    assert!(
        bullets.len() >= 2,
        "expected tab-indented bullets, got: {stdout}"
    );
    let _ = std::fs::remove_file(script);
}

#[test]
fn test_script_args_reach_the_args_builtin() {
    let script = write_script("args", "puts(args(0)); args()");
    let output = rill()
        .arg("--file")
        .arg(&script)
        .arg("--")
        .arg("alpha")
        .arg("beta")
        .output()
        .expect("run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("alpha"));
    assert!(stdout.contains("engine=vm, result=[alpha, beta]"));
    let _ = std::fs::remove_file(script);
}

#[test]
fn test_compile_error_is_reported() {
    let script = write_script("compile-error", "y = 2;");
    let output = rill()
        .arg("--file")
        .arg(&script)
        .output()
        .expect("run binary");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("compile error: undefined variable y"));
    let _ = std::fs::remove_file(script);
}

#[test]
fn test_runtime_error_is_reported() {
    let script = write_script("runtime-error", "5 + true;");
    let output = rill()
        .arg("--file")
        .arg(&script)
        .output()
        .expect("run binary");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("virtual machine error:"));
    let _ = std::fs::remove_file(script);
}
