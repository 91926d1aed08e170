use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::rc::Rc;

use hashbrown::HashMap;
use rill_parser::ast::Block;

use crate::env::Environment;

/// The runtime value universe, shared by the compiler, the VM, and the
/// tree-walking evaluator.
///
/// Arrays and hashes are reference types: cloning a `Value` clones the
/// handle, so built-ins like `push` and `assign` mutate the caller's
/// container. Strings are value types.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<String>),
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<HashMap<HashKey, (Value, Value)>>>),
    /// An evaluator closure over an AST body and its defining environment.
    Function(Rc<AstFunction>),
    /// A compiled function template, produced by the compiler.
    Compiled(Rc<CompiledFunction>),
    /// A compiled function paired with its captured free values.
    Closure(Rc<Closure>),
    Builtin(&'static BuiltinDef),
    /// Wrapper signaling an early return; used only by the evaluator.
    Return(Rc<Value>),
    Error(Rc<String>),
    File(Rc<FileHandle>),
}

/// Tag half of a [`HashKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyTag {
    Int,
    Float,
    Bool,
    Str,
}

/// A hashed key for the hash object: a type tag plus a 64-bit digest.
///
/// Integers use their two's-complement bit pattern, booleans 1/0, strings
/// and floats an FNV-1a 64 digest of their UTF-8 rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: KeyTag,
    pub value: u64,
}

/// A host function exposed to the language. The registry in `rill-stdlib`
/// owns the one ordered list of these; its order is ABI.
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: fn(&[Value]) -> Value,
}

impl fmt::Debug for BuiltinDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinDef({})", self.name)
    }
}

/// Bytecode plus the frame layout facts the VM needs to call it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_parameters: usize,
    pub name: Option<String>,
}

/// A runtime closure: compiled function + captured free values.
///
/// Free slots stay mutable after capture so `SetFree` can write through
/// them.
#[derive(Debug)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: RefCell<Vec<Value>>,
}

impl Closure {
    pub fn new(function: Rc<CompiledFunction>, free: Vec<Value>) -> Closure {
        Closure {
            function,
            free: RefCell::new(free),
        }
    }
}

/// An evaluator function object: parameters, body, and the environment the
/// literal was evaluated in.
pub struct AstFunction {
    pub parameters: Vec<String>,
    pub body: Block,
    pub env: Rc<Environment>,
}

impl fmt::Debug for AstFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The environment is omitted: it can point back at this function.
        write!(f, "AstFunction({})", self.parameters.join(", "))
    }
}

/// An open file, as produced by the `open` built-in.
pub struct FileHandle {
    pub path: String,
    pub state: RefCell<FileState>,
}

pub enum FileState {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
    Closed,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHandle({})", self.path)
    }
}

impl Value {
    pub fn string(value: impl Into<String>) -> Value {
        Value::Str(Rc::new(value.into()))
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn hash(pairs: HashMap<HashKey, (Value, Value)>) -> Value {
        Value::Hash(Rc::new(RefCell::new(pairs)))
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(message.into()))
    }

    /// The type tag used in diagnostics, e.g. `unusable as hash key: ARRAY`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Bool(_) => "BOOLEAN",
            Value::Str(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::Function(_) => "FUNCTION",
            Value::Compiled(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Return(_) => "RETURN_VALUE",
            Value::Error(_) => "ERROR",
            Value::File(_) => "FILE",
        }
    }

    /// Everything is truthy except `null` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// The hashed form of this value, or `None` if it cannot key a hash.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Int(value) => Some(HashKey {
                tag: KeyTag::Int,
                value: *value as u64,
            }),
            Value::Bool(value) => Some(HashKey {
                tag: KeyTag::Bool,
                value: u64::from(*value),
            }),
            Value::Str(value) => Some(HashKey {
                tag: KeyTag::Str,
                value: fnv1a(value.as_bytes()),
            }),
            Value::Float(value) => Some(HashKey {
                tag: KeyTag::Float,
                value: fnv1a(format!("{value:?}").as_bytes()),
            }),
            _ => None,
        }
    }
}

/// Runtime equality, as the `==` operator sees it: structural for the
/// scalar types, reference identity for everything else. Mixed types
/// compare unequal.
pub fn value_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
        (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
        (Value::Compiled(a), Value::Compiled(b)) => Rc::ptr_eq(a, b),
        (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
        (Value::File(a), Value::File(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

/// Structural equality, for tests and cross-engine comparison: containers
/// compare element-wise instead of by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Hash(a), Value::Hash(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(key, (_, value))| {
                        b.get(key).is_some_and(|(_, other)| value == other)
                    })
            }
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Return(a), Value::Return(b)) => a == b,
            (Value::Compiled(a), Value::Compiled(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => value_eq(self, other),
        }
    }
}

impl fmt::Display for Value {
    /// The `inspect` form printed by the REPL and the `string` built-in.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value:?}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Str(value) => f.write_str(value),
            Value::Array(elements) => {
                let rendered: Vec<String> =
                    elements.borrow().iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Hash(pairs) => {
                let rendered: Vec<String> = pairs
                    .borrow()
                    .values()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Value::Function(function) => {
                write!(f, "func({}) {{...}}", function.parameters.join(", "))
            }
            Value::Compiled(function) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(function))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => f.write_str("builtin function"),
            Value::Return(value) => write!(f, "{value}"),
            Value::Error(message) => write!(f, "ERROR: {message}"),
            Value::File(file) => f.write_str(&file.path),
        }
    }
}

/// FNV-1a 64-bit, the digest behind string and float hash keys.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_keys_agree() {
        let hello1 = Value::string("Hello World");
        let hello2 = Value::string("Hello World");
        let diff = Value::string("My name is johnny");

        assert_eq!(hello1.hash_key(), hello2.hash_key());
        assert_ne!(hello1.hash_key(), diff.hash_key());
    }

    #[test]
    fn test_hash_keys_are_type_tagged() {
        // `1`, `1.0`, and `true` must not collide.
        let int = Value::Int(1).hash_key().unwrap();
        let float = Value::Float(1.0).hash_key().unwrap();
        let boolean = Value::Bool(true).hash_key().unwrap();
        assert_ne!(int, float);
        assert_ne!(int, boolean);
        assert_ne!(float, boolean);
    }

    #[test]
    fn test_negative_int_hash_key() {
        let key = Value::Int(-1).hash_key().unwrap();
        assert_eq!(key.value, (-1i64) as u64);
    }

    #[test]
    fn test_only_scalars_are_hashable() {
        assert!(Value::array(vec![]).hash_key().is_none());
        assert!(Value::hash(HashMap::new()).hash_key().is_none());
        assert!(Value::Null.hash_key().is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Float(0.0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn test_runtime_eq_is_identity_for_arrays() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = Value::array(vec![Value::Int(1)]);
        assert!(!value_eq(&a, &b));
        assert!(value_eq(&a, &a.clone()));
        // Structural equality still sees them as equal.
        assert_eq!(a, b);
    }

    #[test]
    fn test_mixed_types_compare_unequal() {
        assert!(!value_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(!value_eq(&Value::Int(0), &Value::Bool(false)));
    }

    #[test]
    fn test_inspect() {
        assert_eq!(Value::Int(5).to_string(), "5");
        assert_eq!(Value::Float(5.0).to_string(), "5.0");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::string("hi").to_string(), "hi");
        assert_eq!(
            Value::array(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
        assert_eq!(Value::error("boom").to_string(), "ERROR: boom");
    }
}
