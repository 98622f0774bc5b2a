//! nair8 - a small scripting language with English keywords
//!
//! Programs are indentation-structured and typed at their bindings. The
//! language has single-inheritance Objects, `do`/`fail`/`always` error
//! handling, `match`, generator Streams and cooperatively scheduled Tasks.

pub mod token;
pub mod lexer;
pub mod parser;
pub mod checker;
pub mod ast;
pub mod types;
pub mod value;
pub mod environment;
pub mod objects;
pub mod machine;
pub mod scheduler;
pub mod builtins;
pub mod interpreter;
pub mod config;
pub mod error;

pub use ast::Program;
pub use config::Config;
pub use error::{CheckError, Error, Result, RuntimeError, RuntimeErrorKind};
pub use interpreter::Interpreter;
pub use lexer::Lexer;
pub use machine::StreamStep;
pub use parser::Parser;
pub use value::Value;

/// What a program printed, and the error that stopped it, if any
#[derive(Debug, Clone)]
pub struct Execution {
    pub outputs: Vec<String>,
    pub error: Option<RuntimeError>,
}

impl Execution {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Lex, parse and check a source text
pub fn parse(source: &str) -> Result<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = Parser::new(tokens).parse()?;
    checker::check(&program)?;
    Ok(program)
}

/// Evaluate a program with the default configuration
pub fn evaluate_program(program: &Program) -> Execution {
    evaluate_with(program, Config::default())
}

pub fn evaluate_with(program: &Program, config: Config) -> Execution {
    let mut interpreter = Interpreter::new(config);
    let error = interpreter.interpret(program).err();
    Execution {
        outputs: interpreter.take_output(),
        error,
    }
}

/// Convenience function to run nair8 code
pub fn run(source: &str) -> Result<Execution> {
    let program = parse(source)?;
    Ok(evaluate_program(&program))
}

/// Version of the nair8 language
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
