//! The runtime core of Rill: the value universe shared by both execution
//! engines, the evaluator's environment chain, and the toolchain error type.

pub mod env;
pub mod error;
pub mod value;

pub use env::Environment;
pub use error::RillError;
pub use value::{
    value_eq, AstFunction, BuiltinDef, Closure, CompiledFunction, FileHandle, FileState, HashKey,
    KeyTag, Value,
};
