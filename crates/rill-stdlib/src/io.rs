use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::rc::Rc;

use rill_core::{FileHandle, FileState, Value};

use crate::error;

/// `puts(x, …)` — print each argument's inspect form on its own line.
pub fn puts(args: &[Value]) -> Value {
    for arg in args {
        println!("{arg}");
    }
    Value::Null
}

/// `open(path)` / `open(path, mode)` — open a file handle. Default mode is
/// read; `"w"` truncates for writing; `"wa"` or `"aw"` appends.
pub fn open(args: &[Value]) -> Value {
    if args.is_empty() || args.len() > 2 {
        return error(format!(
            "wrong number of arguments to `open`. got={}, want=1 or 2",
            args.len()
        ));
    }
    let Value::Str(path) = &args[0] else {
        return error(format!(
            "argument 1 to `open` must be STRING, got {}",
            args[0].type_name()
        ));
    };
    let mode = match args.get(1) {
        None => "",
        Some(Value::Str(mode)) => mode.as_str(),
        Some(other) => {
            return error(format!(
                "argument 2 to `open` must be STRING, got {}",
                other.type_name()
            ));
        }
    };

    let state = match mode {
        "w" => match File::create(path.as_str()) {
            Ok(file) => FileState::Writer(BufWriter::new(file)),
            Err(io_error) => return error(io_error.to_string()),
        },
        "wa" | "aw" => {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(path.as_str())
            {
                Ok(file) => FileState::Writer(BufWriter::new(file)),
                Err(io_error) => return error(io_error.to_string()),
            }
        }
        _ => match File::open(path.as_str()) {
            Ok(file) => FileState::Reader(BufReader::new(file)),
            Err(io_error) => return error(io_error.to_string()),
        },
    };

    Value::File(Rc::new(FileHandle {
        path: path.to_string(),
        state: std::cell::RefCell::new(state),
    }))
}

/// `close(file)` — drop the underlying handle, flushing writers.
pub fn close(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `close`. got={}, want=1",
            args.len()
        ));
    }
    let Value::File(file) = &args[0] else {
        return error(format!(
            "argument to `close` must be FILE, got {}",
            args[0].type_name()
        ));
    };
    let mut state = file.state.borrow_mut();
    if let FileState::Writer(writer) = &mut *state {
        let _ = writer.flush();
    }
    *state = FileState::Closed;
    Value::Bool(true)
}

/// `read(file)` — the next line, including its newline; null at EOF; the
/// empty string when the file is not open for reading.
pub fn read(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `read`. got={}, want=1",
            args.len()
        ));
    }
    let Value::File(file) = &args[0] else {
        return error(format!(
            "argument to `read` must be FILE, got {}",
            args[0].type_name()
        ));
    };
    let mut state = file.state.borrow_mut();
    let FileState::Reader(reader) = &mut *state else {
        return Value::string("");
    };
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) | Err(_) => Value::Null,
        Ok(_) => Value::string(line),
    }
}

/// `write(file, value)` — write the value's inspect form. Returns true on
/// success, false when the file is not open for writing.
pub fn write(args: &[Value]) -> Value {
    if args.len() != 2 {
        return error(format!(
            "wrong number of arguments to `write`. got={}, want=2",
            args.len()
        ));
    }
    let Value::File(file) = &args[0] else {
        return error(format!(
            "argument 1 to `write` must be FILE, got {}",
            args[0].type_name()
        ));
    };
    let mut state = file.state.borrow_mut();
    let FileState::Writer(writer) = &mut *state else {
        return Value::Bool(false);
    };
    match writer.write_all(args[1].to_string().as_bytes()) {
        Ok(()) => {
            let _ = writer.flush();
            Value::Bool(true)
        }
        Err(_) => Value::Bool(false),
    }
}

/// `remove(file)` — delete the file behind a handle. Returns true, or the
/// OS error message as a string.
pub fn remove(args: &[Value]) -> Value {
    if args.len() != 1 {
        return error(format!(
            "wrong number of arguments to `remove`. got={}, want=1",
            args.len()
        ));
    }
    let Value::File(file) = &args[0] else {
        return error(format!(
            "argument 1 to `remove` must be FILE, got {}",
            args[0].type_name()
        ));
    };
    match fs::remove_file(&file.path) {
        Ok(()) => Value::Bool(true),
        Err(io_error) => Value::string(io_error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("rill-stdlib-{name}-{}", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let path = temp_path("roundtrip");

        let file = open(&[Value::string(&*path), Value::string("w")]);
        assert!(matches!(file, Value::File(_)), "open failed: {file}");
        assert_eq!(write(&[file.clone(), Value::string("line one\n")]), Value::Bool(true));
        assert_eq!(write(&[file.clone(), Value::Int(42)]), Value::Bool(true));
        assert_eq!(close(&[file]), Value::Bool(true));

        let file = open(&[Value::string(&*path)]);
        assert_eq!(read(&[file.clone()]), Value::string("line one\n"));
        assert_eq!(read(&[file.clone()]), Value::string("42"));
        assert_eq!(read(&[file.clone()]), Value::Null);
        assert_eq!(close(&[file.clone()]), Value::Bool(true));

        assert_eq!(remove(&[file]), Value::Bool(true));
    }

    #[test]
    fn test_read_on_writer_returns_empty_string() {
        let path = temp_path("writer-read");
        let file = open(&[Value::string(&*path), Value::string("w")]);
        assert_eq!(read(&[file.clone()]), Value::string(""));
        close(&[file.clone()]);
        remove(&[file]);
    }

    #[test]
    fn test_open_missing_file_is_error_value() {
        let result = open(&[Value::string("/no/such/rill/file")]);
        assert!(result.is_error());
    }

    #[test]
    fn test_write_on_reader_returns_false() {
        let path = temp_path("reader-write");
        let file = open(&[Value::string(&*path), Value::string("w")]);
        close(&[file]);
        let file = open(&[Value::string(&*path)]);
        assert_eq!(write(&[file.clone(), Value::Int(1)]), Value::Bool(false));
        close(&[file.clone()]);
        remove(&[file]);
    }
}
