use rill_core::Value;

use crate::error;

/// `len(x)` — element count of an array, character count of a string.
pub fn len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `len`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => Value::Int(elements.borrow().len() as i64),
        Value::Str(value) => Value::Int(value.chars().count() as i64),
        other => error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

/// `first(array)` — the first element, or null for an empty array.
pub fn first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `first`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => elements.borrow().first().cloned().unwrap_or(Value::Null),
        other => error(format!(
            "argument to `first` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

/// `last(array)` — the last element, or null for an empty array.
pub fn last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `last`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => elements.borrow().last().cloned().unwrap_or(Value::Null),
        other => error(format!(
            "argument to `last` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

/// `rest(array)` — a fresh array holding everything but the first element,
/// or null for an empty array.
pub fn rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `rest`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            let elements = elements.borrow();
            if elements.is_empty() {
                return Value::Null;
            }
            Value::array(elements[1..].to_vec())
        }
        other => error(format!(
            "argument to `rest` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

/// `push(array, value)` — append in place; the caller's array grows.
/// Returns the array.
pub fn push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return error(format!(
            "wrong number of arguments to `push`. got={}, want=2",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            elements.borrow_mut().push(args[1].clone());
            args[0].clone()
        }
        other => error(format!(
            "argument to `push` must be ARRAY, got {}",
            other.type_name()
        )),
    }
}

/// `pop(x)` — remove and return the last element of an array (in place).
/// On a string, return the last character as a fresh string; strings are
/// value types and are never mutated.
pub fn pop(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `pop`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => elements.borrow_mut().pop().unwrap_or(Value::Null),
        Value::Str(value) => match value.chars().last() {
            Some(ch) => Value::string(ch.to_string()),
            None => Value::Null,
        },
        other => error(format!(
            "argument to `pop` must be ARRAY or STRING, got {}",
            other.type_name()
        )),
    }
}

/// `keys(hash)` — the keys as an array, in no particular order.
pub fn keys(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `keys`. got={}, want=1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Hash(pairs) => {
            let keys: Vec<Value> = pairs.borrow().values().map(|(key, _)| key.clone()).collect();
            Value::array(keys)
        }
        other => error(format!(
            "argument to `keys` must be HASH, got {}",
            other.type_name()
        )),
    }
}

/// `delete(hash, key)` — remove an entry in place. Missing keys are fine.
pub fn delete(args: &[Value]) -> Value {
    if args.len() != 2 {
        return error(format!(
            "wrong number of arguments to `delete`. got={}, want=2",
            args.len()
        ));
    }
    let Value::Hash(pairs) = &args[0] else {
        return error(format!(
            "argument 1 to `delete` must be HASH, got {}",
            args[0].type_name()
        ));
    };
    let Some(key) = args[1].hash_key() else {
        return error(format!(
            "argument 2 to `delete` must be hashable, got {}",
            args[1].type_name()
        ));
    };
    pairs.borrow_mut().remove(&key);
    Value::Null
}

/// `assign(container, index_or_key, value)` — overwrite an array slot or a
/// hash entry in place.
pub fn assign(args: &[Value]) -> Value {
    if args.len() != 3 {
        return error(format!(
            "wrong number of arguments to `assign`. got={}, want=3",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            let Value::Int(index) = args[1] else {
                return error(format!(
                    "argument 2 to `assign` must be INTEGER, got {}",
                    args[1].type_name()
                ));
            };
            let mut elements = elements.borrow_mut();
            if index < 0 || index as usize >= elements.len() {
                return error("invalid index on array".to_string());
            }
            elements[index as usize] = args[2].clone();
            Value::Null
        }
        Value::Hash(pairs) => {
            let Some(key) = args[1].hash_key() else {
                return error(format!("unusable as hash key: {}", args[1].type_name()));
            };
            pairs
                .borrow_mut()
                .insert(key, (args[1].clone(), args[2].clone()));
            Value::Null
        }
        other => error(format!(
            "argument 1 to `assign` must be ARRAY or HASH, got {}",
            other.type_name()
        )),
    }
}
