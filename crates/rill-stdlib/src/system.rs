use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use hashbrown::HashMap;
use rand::Rng;
use regex::Regex;
use rill_core::Value;

use crate::{error, script_args};

/// Quote-aware splitter for `command`: bare words, `"double quoted"`, and
/// `'single quoted'` chunks.
fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[^\s"']+|"([^"]*)"|'([^']*)'"#).expect("valid regex"))
}

fn split_command_line(line: &str) -> Vec<String> {
    word_pattern()
        .find_iter(line)
        .map(|word| {
            let word = word.as_str();
            if word.len() >= 2
                && ((word.starts_with('"') && word.ends_with('"'))
                    || (word.starts_with('\'') && word.ends_with('\'')))
            {
                word[1..word.len() - 1].to_string()
            } else {
                word.to_string()
            }
        })
        .collect()
}

/// `command(line)` — run a subprocess to completion and return a hash with
/// its `"stdout"` and `"stderr"`.
pub fn command(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `command`. got={}, want=1",
            args.len()
        ));
    }
    let Value::Str(line) = &args[0] else {
        return error(format!(
            "argument to `command` must be STRING, got {}",
            args[0].type_name()
        ));
    };

    let words = split_command_line(line);
    if words.is_empty() {
        return error("empty command".to_string());
    }

    let output = match Command::new(&words[0]).args(&words[1..]).output() {
        Ok(output) => output,
        Err(io_error) => return error(format!("{line} failed : {io_error}")),
    };

    let stdout_key = Value::string("stdout");
    let stderr_key = Value::string("stderr");
    let mut pairs = HashMap::new();
    pairs.insert(
        stdout_key.hash_key().expect("strings are hashable"),
        (
            stdout_key,
            Value::string(String::from_utf8_lossy(&output.stdout).into_owned()),
        ),
    );
    pairs.insert(
        stderr_key.hash_key().expect("strings are hashable"),
        (
            stderr_key,
            Value::string(String::from_utf8_lossy(&output.stderr).into_owned()),
        ),
    );
    Value::hash(pairs)
}

/// `args()` — the script's command-line arguments as an array.
/// `args(i)` — a single argument by index.
pub fn args(arguments: &[Value]) -> Value {
    match arguments.len() {
        0 => Value::array(
            script_args()
                .iter()
                .map(|arg| Value::string(arg.clone()))
                .collect(),
        ),
        1 => {
            let Value::Int(index) = arguments[0] else {
                return error(format!(
                    "argument to `args` must be INTEGER, got {}",
                    arguments[0].type_name()
                ));
            };
            let script_args = script_args();
            if index < 0 || index as usize >= script_args.len() {
                return error("out of bounds index".to_string());
            }
            Value::string(script_args[index as usize].clone())
        }
        n => error(format!(
            "wrong number of arguments to `args`. got={n}, want=0 or 1"
        )),
    }
}

/// `wait(n)` — sleep for `n` seconds (integer) or fractional seconds
/// (float).
pub fn wait(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `wait`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Int(seconds) => {
            std::thread::sleep(Duration::from_secs((*seconds).max(0) as u64));
            Value::Null
        }
        Value::Float(seconds) => {
            std::thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
            Value::Null
        }
        other => error(format!(
            "argument to `wait` must be INTEGER or FLOAT, got {}",
            other.type_name()
        )),
    }
}

/// `rand()` — a uniform float in `[0, 1)`.
pub fn rand(args: &[Value]) -> Value {
    if !args.is_empty() {
        return error(format!(
            "wrong number of arguments to `rand`. got={}, want=0",
            args.len()
        ));
    }
    Value::Float(::rand::rng().random::<f64>())
}
