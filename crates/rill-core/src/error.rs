use thiserror::Error;

/// The shared error type for the whole toolchain.
///
/// Parse errors are accumulated by the parser and joined before they land
/// here; compile and runtime errors abort the current execution immediately.
/// Errors produced *inside* the language by built-ins are not `RillError`s:
/// they are ordinary [`crate::Value::Error`] values.
#[derive(Debug, Clone, Error)]
pub enum RillError {
    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Runtime(String),

    #[error("could not read {path}: {message}")]
    Io { path: String, message: String },
}

impl RillError {
    pub fn compile(message: impl Into<String>) -> Self {
        RillError::Compile(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        RillError::Runtime(message.into())
    }
}
