use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use rill_core::{Environment, Value};
use rill_vm::{Compiler, VM, GLOBALS_SIZE};

use crate::Engine;

const PROMPT: &str = ">> ";

/// Parse errors print one tab-indented bullet per message and never kill
/// the session.
pub fn print_parse_errors(errors: &[String]) {
    for error in errors {
        println!("\t- {error}");
    }
}

pub fn start(engine: Engine) {
    println!(
        "rill v{} — type an expression, ctrl-d to exit",
        env!("CARGO_PKG_VERSION")
    );

    let Ok(editor) = DefaultEditor::new() else {
        eprintln!("could not initialize line editor");
        return;
    };

    match engine {
        Engine::Vm => repl_vm(editor),
        Engine::Eval => repl_eval(editor),
    }
}

/// The VM session threads three pieces of state across lines: the symbol
/// table (so names keep their global indices), the constant pool, and the
/// globals array.
fn repl_vm(mut editor: DefaultEditor) {
    let (mut symbols, mut constants) = Compiler::new().into_state();
    let mut globals = vec![Value::Null; GLOBALS_SIZE];

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(&line);

        let (program, errors) = rill_parser::parse(&line);
        if !errors.is_empty() {
            print_parse_errors(&errors);
            continue;
        }

        let mut compiler = Compiler::with_state(symbols, constants);
        let compiled = compiler.compile(&program);
        let bytecode = compiler.bytecode();
        (symbols, constants) = compiler.into_state();

        if let Err(error) = compiled {
            println!("compile error: {error}");
            continue;
        }

        let mut machine = VM::with_globals(bytecode, globals);
        let outcome = machine.run();
        let result = machine.last_popped();
        globals = machine.into_globals();

        match outcome {
            Ok(()) => println!("{result}"),
            Err(error) => println!("virtual machine error: {error}"),
        }
    }
}

fn repl_eval(mut editor: DefaultEditor) {
    let env = Environment::new();

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(&line);

        let (program, errors) = rill_parser::parse(&line);
        if !errors.is_empty() {
            print_parse_errors(&errors);
            continue;
        }

        let result = rill_eval::eval_program(&program, &env);
        println!("{result}");
    }
}
