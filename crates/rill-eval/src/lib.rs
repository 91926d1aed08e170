//! Tree-walking evaluator for Rill.
//!
//! The second execution engine, selected with `--engine eval`. It shares
//! the value universe and the built-in registry with the bytecode VM and
//! must agree with it on every program. Errors travel as ordinary
//! `Value::Error` values; early returns ride the `Value::Return` wrapper
//! until a function boundary or the program top level unwraps them.

use std::rc::Rc;

use hashbrown::HashMap;
use rill_core::{value_eq, AstFunction, Environment, Value};
use rill_parser::ast::{
    Block, Expression, FunctionLit, InfixOp, PrefixOp, Program, Statement, SwitchCase,
};

/// Evaluate a whole program, unwrapping any top-level return.
pub fn eval_program(program: &Program, env: &Rc<Environment>) -> Value {
    let mut result = Value::Null;
    for statement in &program.statements {
        result = eval_statement(statement, env);
        match result {
            Value::Return(value) => return value.as_ref().clone(),
            Value::Error(_) => return result,
            _ => {}
        }
    }
    result
}

/// Parse and evaluate `input` against a fresh environment.
pub fn eval_source(input: &str) -> Result<Value, Vec<String>> {
    let (program, errors) = rill_parser::parse(input);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(eval_program(&program, &Environment::new()))
}

fn eval_statement(statement: &Statement, env: &Rc<Environment>) -> Value {
    match statement {
        Statement::Let { name, value } => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            env.set(name, value);
            Value::Null
        }
        Statement::Assign { name, value } => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            if !env.assign(name, value.clone()) {
                return Value::error(format!("undefined variable {name}"));
            }
            value
        }
        Statement::Return(value) => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            Value::Return(Rc::new(value))
        }
        Statement::Expression(expression) => eval_expression(expression, env),
    }
}

/// Like the program loop, but a `Return` passes through unopened so that
/// a return in a nested block still exits the enclosing function.
fn eval_block(block: &Block, env: &Rc<Environment>) -> Value {
    let mut result = Value::Null;
    for statement in &block.statements {
        result = eval_statement(statement, env);
        if matches!(result, Value::Return(_) | Value::Error(_)) {
            return result;
        }
    }
    result
}

fn eval_expression(expression: &Expression, env: &Rc<Environment>) -> Value {
    match expression {
        Expression::Identifier(name) => eval_identifier(name, env),
        Expression::Integer(value) => Value::Int(*value),
        Expression::Float(value) => Value::Float(*value),
        Expression::Boolean(value) => Value::Bool(*value),
        Expression::Str(value) => Value::string(value.clone()),
        Expression::Array(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                let value = eval_expression(element, env);
                if value.is_error() {
                    return value;
                }
                values.push(value);
            }
            Value::array(values)
        }
        Expression::Hash(pairs) => eval_hash_literal(pairs, env),
        Expression::Prefix { operator, right } => {
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_prefix(*operator, right)
        }
        Expression::Infix {
            operator,
            left,
            right,
        } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_infix(*operator, left, right)
        }
        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let index = eval_expression(index, env);
            if index.is_error() {
                return index;
            }
            eval_index(left, index)
        }
        Expression::If {
            condition,
            consequence,
            alternative,
        } => {
            let condition = eval_expression(condition, env);
            if condition.is_error() {
                return condition;
            }
            if condition.is_truthy() {
                eval_block(consequence, env)
            } else if let Some(alternative) = alternative {
                eval_block(alternative, env)
            } else {
                Value::Null
            }
        }
        Expression::While { condition, body } => eval_while(condition, body, env),
        Expression::Switch { value, cases } => eval_switch(value, cases, env),
        Expression::Function(literal) => eval_function_literal(literal, env),
        Expression::Call {
            function,
            arguments,
        } => {
            let function = eval_expression(function, env);
            if function.is_error() {
                return function;
            }
            let mut args = Vec::with_capacity(arguments.len());
            for argument in arguments {
                let value = eval_expression(argument, env);
                if value.is_error() {
                    return value;
                }
                args.push(value);
            }
            apply_function(function, args)
        }
    }
}

fn eval_identifier(name: &str, env: &Rc<Environment>) -> Value {
    if let Some(value) = env.get(name) {
        return value;
    }
    if let Some(builtin) = rill_stdlib::lookup(name) {
        return Value::Builtin(builtin);
    }
    Value::error(format!("identifier not found: {name}"))
}

fn eval_prefix(operator: PrefixOp, right: Value) -> Value {
    match operator {
        PrefixOp::Not => Value::Bool(!right.is_truthy()),
        PrefixOp::Minus => match right {
            Value::Int(value) => Value::Int(value.wrapping_neg()),
            Value::Float(value) => Value::Float(-value),
            other => Value::error(format!("unknown operator: -{}", other.type_name())),
        },
    }
}

fn eval_infix(operator: InfixOp, left: Value, right: Value) -> Value {
    match operator {
        InfixOp::And => return Value::Bool(left.is_truthy() && right.is_truthy()),
        InfixOp::Or => return Value::Bool(left.is_truthy() || right.is_truthy()),
        _ => {}
    }

    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => eval_integer_infix(operator, *a, *b),
        (Value::Float(a), Value::Float(b)) => eval_float_infix(operator, *a, *b),
        (Value::Str(a), Value::Str(b)) => match operator {
            InfixOp::Add => Value::string(format!("{a}{b}")),
            InfixOp::Eq => Value::Bool(a == b),
            InfixOp::NotEq => Value::Bool(a != b),
            _ => Value::error(format!(
                "unknown operator: {} {} {}",
                left.type_name(),
                operator,
                right.type_name()
            )),
        },
        _ => match operator {
            InfixOp::Eq => Value::Bool(value_eq(&left, &right)),
            InfixOp::NotEq => Value::Bool(!value_eq(&left, &right)),
            _ if left.type_name() != right.type_name() => Value::error(format!(
                "type mismatch: {} {} {}",
                left.type_name(),
                operator,
                right.type_name()
            )),
            _ => Value::error(format!(
                "unknown operator: {} {} {}",
                left.type_name(),
                operator,
                right.type_name()
            )),
        },
    }
}

fn eval_integer_infix(operator: InfixOp, a: i64, b: i64) -> Value {
    match operator {
        InfixOp::Add => Value::Int(a.wrapping_add(b)),
        InfixOp::Sub => Value::Int(a.wrapping_sub(b)),
        InfixOp::Mul => Value::Int(a.wrapping_mul(b)),
        InfixOp::Div => {
            if b == 0 {
                Value::error("division by zero")
            } else {
                Value::Int(a.wrapping_div(b))
            }
        }
        InfixOp::Mod => {
            if b == 0 {
                Value::error("division by zero")
            } else {
                Value::Int(a.wrapping_rem(b))
            }
        }
        InfixOp::Lt => Value::Bool(a < b),
        InfixOp::Gt => Value::Bool(a > b),
        InfixOp::Eq => Value::Bool(a == b),
        InfixOp::NotEq => Value::Bool(a != b),
        InfixOp::And | InfixOp::Or => unreachable!("handled before type dispatch"),
    }
}

fn eval_float_infix(operator: InfixOp, a: f64, b: f64) -> Value {
    match operator {
        InfixOp::Add => Value::Float(a + b),
        InfixOp::Sub => Value::Float(a - b),
        InfixOp::Mul => Value::Float(a * b),
        InfixOp::Div => Value::Float(a / b),
        InfixOp::Mod => Value::Float(a % b),
        InfixOp::Lt => Value::Bool(a < b),
        InfixOp::Gt => Value::Bool(a > b),
        InfixOp::Eq => Value::Bool(a == b),
        InfixOp::NotEq => Value::Bool(a != b),
        InfixOp::And | InfixOp::Or => unreachable!("handled before type dispatch"),
    }
}

fn eval_while(condition: &Expression, body: &Block, env: &Rc<Environment>) -> Value {
    loop {
        let condition = eval_expression(condition, env);
        if condition.is_error() {
            return condition;
        }
        if !condition.is_truthy() {
            break;
        }
        let result = eval_block(body, env);
        if matches!(result, Value::Return(_) | Value::Error(_)) {
            return result;
        }
    }
    Value::Null
}

fn eval_switch(value: &Expression, cases: &[SwitchCase], env: &Rc<Environment>) -> Value {
    let value = eval_expression(value, env);
    if value.is_error() {
        return value;
    }

    for case in cases {
        let Some(case_value) = &case.value else {
            continue;
        };
        let case_value = eval_expression(case_value, env);
        if case_value.is_error() {
            return case_value;
        }
        if value_eq(&value, &case_value) {
            return eval_block(&case.body, env);
        }
    }

    for case in cases {
        if case.value.is_none() {
            return eval_block(&case.body, env);
        }
    }

    Value::Null
}

fn eval_hash_literal(pairs: &[(Expression, Expression)], env: &Rc<Environment>) -> Value {
    let mut hash = HashMap::with_capacity(pairs.len());
    for (key_expression, value_expression) in pairs {
        let key = eval_expression(key_expression, env);
        if key.is_error() {
            return key;
        }
        let Some(hash_key) = key.hash_key() else {
            return Value::error(format!("unusable as hash key: {}", key.type_name()));
        };
        let value = eval_expression(value_expression, env);
        if value.is_error() {
            return value;
        }
        hash.insert(hash_key, (key, value));
    }
    Value::hash(hash)
}

fn eval_index(left: Value, index: Value) -> Value {
    match (&left, &index) {
        (Value::Array(elements), Value::Int(i)) => {
            let elements = elements.borrow();
            if *i < 0 || *i as usize >= elements.len() {
                Value::Null
            } else {
                elements[*i as usize].clone()
            }
        }
        (Value::Str(value), Value::Int(i)) => {
            if *i < 0 {
                Value::Null
            } else {
                value
                    .chars()
                    .nth(*i as usize)
                    .map(|ch| Value::string(ch.to_string()))
                    .unwrap_or(Value::Null)
            }
        }
        (Value::Hash(pairs), _) => {
            let Some(key) = index.hash_key() else {
                return Value::error(format!("unusable as hash key: {}", index.type_name()));
            };
            pairs
                .borrow()
                .get(&key)
                .map(|(_, value)| value.clone())
                .unwrap_or(Value::Null)
        }
        _ => Value::error(format!(
            "index operator not supported: {}",
            left.type_name()
        )),
    }
}

fn eval_function_literal(literal: &FunctionLit, env: &Rc<Environment>) -> Value {
    let function = Value::Function(Rc::new(AstFunction {
        parameters: literal.parameters.clone(),
        body: literal.body.clone(),
        env: Rc::clone(env),
    }));
    // A named literal binds itself so the body can recurse.
    if let Some(name) = &literal.name {
        env.set(name, function.clone());
    }
    function
}

fn apply_function(function: Value, args: Vec<Value>) -> Value {
    match function {
        Value::Function(function) => {
            if args.len() != function.parameters.len() {
                return Value::error(format!(
                    "wrong number of arguments: want={}, got={}",
                    function.parameters.len(),
                    args.len()
                ));
            }
            let scope = Environment::new_enclosed(Rc::clone(&function.env));
            for (parameter, value) in function.parameters.iter().zip(args) {
                scope.set(parameter, value);
            }
            match eval_block(&function.body, &scope) {
                Value::Return(value) => value.as_ref().clone(),
                other => other,
            }
        }
        Value::Builtin(builtin) => (builtin.func)(&args),
        other => Value::error(format!("not a function: {}", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> Value {
        eval_source(input).unwrap_or_else(|errors| panic!("parse failed for {input:?}: {errors:?}"))
    }

    fn assert_runs(tests: &[(&str, Value)]) {
        for (input, expected) in tests {
            assert_eq!(&run(input), expected, "input: {input}");
        }
    }

    #[test]
    fn test_integer_and_float_arithmetic() {
        assert_runs(&[
            ("5", Value::Int(5)),
            ("-5", Value::Int(-5)),
            ("5 + 5 + 5 + 5 - 10", Value::Int(10)),
            ("2 * 2 * 2 * 2 * 2", Value::Int(32)),
            ("50 / 2 * 2 + 10 - 5", Value::Int(55)),
            ("7 % 2", Value::Int(1)),
            ("3.5 + 1.5", Value::Float(5.0)),
            ("5.5 % 2.0", Value::Float(1.5)),
            ("-2.5", Value::Float(-2.5)),
        ]);
    }

    #[test]
    fn test_boolean_expressions() {
        assert_runs(&[
            ("true", Value::Bool(true)),
            ("1 < 2", Value::Bool(true)),
            ("1 > 2", Value::Bool(false)),
            ("1 == 1", Value::Bool(true)),
            ("true != false", Value::Bool(true)),
            ("!true", Value::Bool(false)),
            ("!null", Value::Bool(true)),
            ("true and false", Value::Bool(false)),
            ("true or false", Value::Bool(true)),
            ("1 and 2", Value::Bool(true)),
            ("1 == 1.0", Value::Bool(false)),
        ]);
    }

    #[test]
    fn test_if_while_switch() {
        assert_runs(&[
            ("if (true) { 10 }", Value::Int(10)),
            ("if (false) { 10 }", Value::Null),
            ("if (1 > 2) { 10 } else { 20 }", Value::Int(20)),
            (
                "let i = 0; while (i < 5) { i = i + 1; }; i",
                Value::Int(5),
            ),
            ("while (false) { 1; }", Value::Null),
            (
                "switch (2) { case 1 { 10 } case 2 { 20 } default { 0 } }",
                Value::Int(20),
            ),
            (
                "switch (9) { case 1 { 10 } default { 0 } }",
                Value::Int(0),
            ),
            ("switch (9) { case 1 { 10 } }", Value::Null),
        ]);
    }

    #[test]
    fn test_let_assign_and_identifiers() {
        assert_runs(&[
            ("let a = 5; a;", Value::Int(5)),
            ("let a = 5 * 5; a;", Value::Int(25)),
            ("let a = 5; let b = a; b;", Value::Int(5)),
            ("let a = 5; a = 6; a", Value::Int(6)),
        ]);

        assert_eq!(
            run("foobar"),
            Value::error("identifier not found: foobar")
        );
        assert_eq!(run("x = 1; x"), Value::error("undefined variable x"));
    }

    #[test]
    fn test_return_statements() {
        assert_runs(&[
            ("return 10;", Value::Int(10)),
            ("return 10; 9;", Value::Int(10)),
            ("return 2 * 5; 9;", Value::Int(10)),
            ("9; return 10; 9;", Value::Int(10)),
            (
                "if (10 > 1) { if (10 > 1) { return 10; } return 1; }",
                Value::Int(10),
            ),
        ]);
    }

    #[test]
    fn test_functions_and_closures() {
        assert_runs(&[
            ("let identity = func(x) { x; }; identity(5);", Value::Int(5)),
            ("let double = func(x) { x * 2; }; double(5);", Value::Int(10)),
            (
                "let add = func(a, b) { a + b; }; add(5 + 5, add(5, 5));",
                Value::Int(20),
            ),
            ("func(x) { x; }(5)", Value::Int(5)),
            (
                "let newAdder = func(a) { func(b) { a + b } };
                 let addTwo = newAdder(2);
                 addTwo(3)",
                Value::Int(5),
            ),
            (
                "let countDown = func(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
                 countDown(3);",
                Value::Int(0),
            ),
            (
                "let fibonacci = func(x) {
                     if (x == 0) { return 0; }
                     if (x == 1) { return 1; }
                     fibonacci(x - 1) + fibonacci(x - 2);
                 };
                 fibonacci(10);",
                Value::Int(55),
            ),
        ]);

        assert_eq!(
            run("let f = func(a) { a }; f()"),
            Value::error("wrong number of arguments: want=1, got=0")
        );
        assert_eq!(run("1()"), Value::error("not a function: INTEGER"));
    }

    #[test]
    fn test_strings_arrays_hashes() {
        assert_runs(&[
            (r#""ri" + "ll""#, Value::string("rill")),
            (r#"len("four")"#, Value::Int(4)),
            ("[1, 2, 3][0]", Value::Int(1)),
            ("[1, 2, 3][3]", Value::Null),
            ("[1][-1]", Value::Null),
            (r#""hello"[0]"#, Value::string("h")),
            ("{1: 2, 2: 3}[2]", Value::Int(3)),
            ("{1: 1}[0]", Value::Null),
            (r#"{"a": 5}["a"]"#, Value::Int(5)),
        ]);

        assert_eq!(
            run("{[1]: 2}"),
            Value::error("unusable as hash key: ARRAY")
        );
        assert_eq!(
            run("{[1]: 2}[[1]]"),
            Value::error("unusable as hash key: ARRAY")
        );
    }

    #[test]
    fn test_error_propagation() {
        assert_eq!(
            run("5 + true;"),
            Value::error("type mismatch: INTEGER + BOOLEAN")
        );
        assert_eq!(
            run("5 + true; 5;"),
            Value::error("type mismatch: INTEGER + BOOLEAN")
        );
        assert_eq!(
            run("-true"),
            Value::error("unknown operator: -BOOLEAN")
        );
        assert_eq!(
            run("if (10 > 1) { true + false; }"),
            Value::error("unknown operator: BOOLEAN + BOOLEAN")
        );
        assert_eq!(run("1 / 0"), Value::error("division by zero"));
    }

    #[test]
    fn test_shared_container_identity() {
        assert_runs(&[
            ("let a = [1]; let b = a; push(a, 2); b[1]", Value::Int(2)),
            (
                "let h = {1: 1}; let g = h; assign(g, 1, 9); h[1]",
                Value::Int(9),
            ),
        ]);
    }
}
