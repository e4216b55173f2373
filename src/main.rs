mod call_frame;
mod chunk;
mod compiler;
mod debug;
mod gc;
mod objects;
mod scanner;
mod table;
mod value;
mod vm;

use std::io::{self, Write};
use std::process::ExitCode;

use vm::{InterpretResult, Vm};

/// Thin entry point: dispatch on argument count, hand everything else to `Vm`.
/// Exit codes follow the usual convention for this kind of script runner: 0 on a clean
/// run, 65 for a compile error, 70 for a runtime error, 74 for an I/O failure, 64 for a
/// bad invocation.
fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    match args.len() {
        1 => repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: {} [path]", args.first().map(String::as_str).unwrap_or("embergrove"));
            ExitCode::from(64)
        }
    }
}

fn repl() -> ExitCode {
    let mut vm = Vm::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return ExitCode::from(74);
        }

        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => {
                println!();
                return ExitCode::SUCCESS;
            }
            Ok(_) => {
                vm.interpret(&line);
            }
            Err(_) => return ExitCode::from(74),
        }
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read file \"{path}\": {err}");
            return ExitCode::from(74);
        }
    };

    let mut vm = Vm::new();
    match vm.interpret(&source) {
        InterpretResult::InterpretOk => ExitCode::SUCCESS,
        InterpretResult::InterpretCompileError => ExitCode::from(65),
        InterpretResult::InterpretRuntimeError => ExitCode::from(70),
    }
}
