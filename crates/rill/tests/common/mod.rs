use rill_core::{Environment, Value};

/// Run `input` through the bytecode compiler and VM.
pub fn eval_vm(input: &str) -> Result<Value, String> {
    let bytecode = rill_vm::compile_source(input).map_err(|error| error.to_string())?;
    let mut machine = rill_vm::VM::new(bytecode);
    machine.run().map_err(|error| error.to_string())?;
    Ok(machine.last_popped())
}

/// Run `input` through the tree-walking evaluator. Error values count as
/// failures so the two engines' error behavior can be compared.
pub fn eval_tw(input: &str) -> Result<Value, String> {
    let (program, errors) = rill_parser::parse(input);
    if !errors.is_empty() {
        return Err(errors.join("; "));
    }
    let result = rill_eval::eval_program(&program, &Environment::new());
    if let Value::Error(message) = &result {
        return Err(message.to_string());
    }
    Ok(result)
}

/// Assert both engines succeed and agree, and return the shared result.
#[allow(dead_code)]
pub fn eval_both(input: &str) -> Value {
    let vm = eval_vm(input).unwrap_or_else(|error| panic!("VM failed for {input:?}: {error}"));
    let tw = eval_tw(input)
        .unwrap_or_else(|error| panic!("tree-walker failed for {input:?}: {error}"));
    assert_eq!(vm, tw, "engines disagree for: {input}");
    vm
}

/// Generate one `vm` and one `eval` test per case, both asserting the
/// same expected value.
///
/// ```ignore
/// dual_engine_tests! {
///     addition: "1 + 2" => Value::Int(3),
/// }
/// ```
#[macro_export]
macro_rules! dual_engine_tests {
    ($($name:ident: $input:expr => $expected:expr,)*) => {
        $(
            mod $name {
                use super::*;

                #[test]
                fn vm() {
                    let result = common::eval_vm($input)
                        .unwrap_or_else(|error| panic!("VM failed for {:?}: {error}", $input));
                    assert_eq!(result, $expected, "input: {}", $input);
                }

                #[test]
                fn eval() {
                    let result = common::eval_tw($input)
                        .unwrap_or_else(|error| panic!("tree-walker failed for {:?}: {error}", $input));
                    assert_eq!(result, $expected, "input: {}", $input);
                }
            }
        )*
    };
}

/// Generate one `vm` and one `eval` test per case, both asserting the
/// program fails (abort or error value).
#[macro_export]
macro_rules! dual_engine_error_tests {
    ($($name:ident: $input:expr,)*) => {
        $(
            mod $name {
                use super::*;

                #[test]
                fn vm() {
                    assert!(
                        common::eval_vm($input).is_err(),
                        "VM should fail for: {}",
                        $input
                    );
                }

                #[test]
                fn eval() {
                    assert!(
                        common::eval_tw($input).is_err(),
                        "tree-walker should fail for: {}",
                        $input
                    );
                }
            }
        )*
    };
}
