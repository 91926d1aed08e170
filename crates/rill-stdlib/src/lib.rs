//! The built-in function registry.
//!
//! `BUILTINS` is a single ordered list, frozen at compile time. Its order is
//! part of the ABI: the compiler emits `GetBuiltin i` where `i` is the fixed
//! position here, and the VM indexes the same list at call time. Append new
//! built-ins at the end; never reorder.
//!
//! Built-ins validate argument count and types themselves and report misuse
//! as `Value::Error` values, which propagate through the language like any
//! other value.

mod collections;
mod convert;
mod io;
mod system;

use std::sync::OnceLock;

use rill_core::{BuiltinDef, Value};

pub static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef { name: "len", func: collections::len },
    BuiltinDef { name: "puts", func: io::puts },
    BuiltinDef { name: "first", func: collections::first },
    BuiltinDef { name: "last", func: collections::last },
    BuiltinDef { name: "rest", func: collections::rest },
    BuiltinDef { name: "push", func: collections::push },
    BuiltinDef { name: "pop", func: collections::pop },
    BuiltinDef { name: "string", func: convert::string },
    BuiltinDef { name: "keys", func: collections::keys },
    BuiltinDef { name: "delete", func: collections::delete },
    BuiltinDef { name: "assign", func: collections::assign },
    BuiltinDef { name: "type", func: convert::type_of },
    BuiltinDef { name: "command", func: system::command },
    BuiltinDef { name: "open", func: io::open },
    BuiltinDef { name: "close", func: io::close },
    BuiltinDef { name: "read", func: io::read },
    BuiltinDef { name: "write", func: io::write },
    BuiltinDef { name: "remove", func: io::remove },
    BuiltinDef { name: "args", func: system::args },
    BuiltinDef { name: "wait", func: system::wait },
    BuiltinDef { name: "int", func: convert::int },
    BuiltinDef { name: "float", func: convert::float },
    BuiltinDef { name: "rand", func: system::rand },
];

/// Look a built-in up by name (used by the evaluator).
pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|def| def.name == name)
}

/// The registry index of a built-in (used by the compiler's symbol table).
pub fn position(name: &str) -> Option<usize> {
    BUILTINS.iter().position(|def| def.name == name)
}

static SCRIPT_ARGS: OnceLock<Vec<String>> = OnceLock::new();

/// Record the command-line arguments that follow the interpreter's own
/// flags; the `args` built-in reads them. May be set once per process.
pub fn set_script_args(args: Vec<String>) {
    let _ = SCRIPT_ARGS.set(args);
}

pub(crate) fn script_args() -> &'static [String] {
    SCRIPT_ARGS.get().map(Vec::as_slice).unwrap_or(&[])
}

pub(crate) fn error(message: String) -> Value {
    Value::error(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_is_stable() {
        // The first entries are load-bearing: OpGetBuiltin operands in
        // already-compiled bytecode depend on them.
        let names: Vec<&str> = BUILTINS.iter().map(|def| def.name).collect();
        assert_eq!(
            names,
            vec![
                "len", "puts", "first", "last", "rest", "push", "pop", "string", "keys",
                "delete", "assign", "type", "command", "open", "close", "read", "write",
                "remove", "args", "wait", "int", "float", "rand",
            ]
        );
    }

    #[test]
    fn test_lookup_and_position_agree() {
        for (index, def) in BUILTINS.iter().enumerate() {
            assert_eq!(position(def.name), Some(index));
            assert!(lookup(def.name).is_some());
        }
        assert_eq!(position("no-such-builtin"), None);
    }
}
