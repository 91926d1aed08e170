use rill_core::Value;

use crate::error;

/// `string(x)` — the inspect form of any value.
pub fn string(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `string`. got={}, want=1",
            args.len()
        ));
    }
    Value::string(args[0].to_string())
}

/// `type(x)` — the type tag as a string, e.g. `"INTEGER"`.
pub fn type_of(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `type`. got={}, want=1",
            args.len()
        ));
    }
    Value::string(args[0].type_name())
}

/// `int(x)` — truncate a float or parse a string.
pub fn int(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `int`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Float(value) => Value::Int(*value as i64),
        Value::Str(value) => match value.trim().parse::<i64>() {
            Ok(parsed) => Value::Int(parsed),
            Err(parse_error) => error(parse_error.to_string()),
        },
        other => error(format!(
            "argument to `int` must be FLOAT or STRING, got {}",
            other.type_name()
        )),
    }
}

/// `float(x)` — widen an integer or parse a string.
pub fn float(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `float`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Int(value) => Value::Float(*value as f64),
        Value::Str(value) => match value.trim().parse::<f64>() {
            Ok(parsed) => Value::Float(parsed),
            Err(parse_error) => error(parse_error.to_string()),
        },
        other => error(format!(
            "argument to `float` must be INTEGER or STRING, got {}",
            other.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string() {
        assert_eq!(string(&[Value::Int(42)]), Value::string("42"));
        assert_eq!(
            string(&[Value::array(vec![Value::Int(1)])]),
            Value::string("[1]")
        );
    }

    #[test]
    fn test_type_of() {
        assert_eq!(type_of(&[Value::Int(1)]), Value::string("INTEGER"));
        assert_eq!(type_of(&[Value::Null]), Value::string("NULL"));
        assert_eq!(type_of(&[Value::array(vec![])]), Value::string("ARRAY"));
    }

    #[test]
    fn test_int() {
        assert_eq!(int(&[Value::Float(3.9)]), Value::Int(3));
        assert_eq!(int(&[Value::Float(-3.9)]), Value::Int(-3));
        assert_eq!(int(&[Value::string("12")]), Value::Int(12));
        assert!(int(&[Value::string("not a number")]).is_error());
        assert!(int(&[Value::Bool(true)]).is_error());
    }

    #[test]
    fn test_float() {
        assert_eq!(float(&[Value::Int(3)]), Value::Float(3.0));
        assert_eq!(float(&[Value::string("2.5")]), Value::Float(2.5));
        assert!(float(&[Value::string("nope")]).is_error());
    }
}
