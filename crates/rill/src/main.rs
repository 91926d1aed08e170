use std::fs;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use rill_core::Environment;
use rill_vm::{Compiler, VM};

mod repl;

/// Which execution engine runs the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Bytecode compiler + virtual machine.
    Vm,
    /// Tree-walking evaluator.
    Eval,
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Vm => f.write_str("vm"),
            Engine::Eval => f.write_str("eval"),
        }
    }
}

#[derive(Parser)]
#[command(name = "rill", about = "The Rill programming language", version)]
struct Cli {
    /// Execution engine
    #[arg(long, value_enum, default_value_t = Engine::Vm)]
    engine: Engine,

    /// Source file to run, or "repl" for the interactive prompt
    #[arg(long, default_value = "repl")]
    file: String,

    /// Print how long execution took
    #[arg(long)]
    bench: bool,

    /// Arguments exposed to the script through the `args` built-in
    #[arg(last = true)]
    script_args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    rill_stdlib::set_script_args(cli.script_args);

    if cli.file == "repl" {
        repl::start(cli.engine);
        return ExitCode::SUCCESS;
    }

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("could not read: {error}");
            return ExitCode::FAILURE;
        }
    };

    run_source(&source, cli.engine, cli.bench);
    ExitCode::SUCCESS
}

fn run_source(source: &str, engine: Engine, bench: bool) {
    let (program, errors) = rill_parser::parse(source);
    if !errors.is_empty() {
        repl::print_parse_errors(&errors);
    }

    match engine {
        Engine::Vm => {
            let mut compiler = Compiler::new();
            if let Err(error) = compiler.compile(&program) {
                eprintln!("compile error: {error}");
                return;
            }

            let mut machine = VM::new(compiler.bytecode());
            let start = Instant::now();
            if let Err(error) = machine.run() {
                eprintln!("virtual machine error: {error}");
                return;
            }
            let duration = start.elapsed();

            println!("engine={engine}, result={}", machine.last_popped());
            if bench {
                println!("duration={duration:?}");
            }
        }
        Engine::Eval => {
            let env = Environment::new();
            let start = Instant::now();
            let result = rill_eval::eval_program(&program, &env);
            let duration = start.elapsed();

            println!("engine={engine}, result={result}");
            if bench {
                println!("duration={duration:?}");
            }
        }
    }
}
