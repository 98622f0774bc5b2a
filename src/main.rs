//! nair8 CLI and REPL
//!
//! Usage:
//!   nair8 run <file.n8>   - Execute a nair8 file
//!   nair8 repl            - Start interactive REPL (`load <file>` runs a script in it)

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use nair8::{Config, Error, Interpreter, VERSION};

#[derive(ClapParser)]
#[command(
    name = "nair8",
    about = "nair8: an English-keyword scripting language",
    version = VERSION,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Run a nair8 script file
    Run {
        /// Path to the script
        file: PathBuf,

        /// Trace calls, stream resumptions and tasks on stderr
        #[arg(long)]
        trace: bool,

        /// Maximum nested call depth
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Leave tasks parked at an await unfinished at exit
        #[arg(long)]
        no_drain: bool,
    },

    /// Launch the interactive REPL
    Repl {
        #[arg(long)]
        trace: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, trace, max_depth, no_drain } => {
            let mut config = Config::default().with_trace(trace).with_drain_tasks(!no_drain);
            if let Some(depth) = max_depth {
                config = config.with_max_call_depth(depth);
            }
            run_file(&file, config);
        }
        Commands::Repl { trace } => run_repl(Config::default().with_trace(trace)),
    }
}

fn run_file(path: &Path, config: Config) {
    let source = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("{}: cannot read file '{}': {}", "error".red(), path.display(), e);
            process::exit(1);
        }
    };

    let program = match nair8::parse(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e.with_source(&source));
            process::exit(1);
        }
    };

    let mut interpreter = Interpreter::new(config);
    let result = interpreter.interpret(&program);

    for line in interpreter.take_output() {
        println!("{}", line);
    }

    if let Err(e) = result {
        eprintln!("{}", Error::from(e).with_source(&source).to_string().red());
        process::exit(1);
    }
}

fn run_repl(config: Config) {
    println!(
        "{} {} - {}",
        "nair8".cyan().bold(),
        VERSION.cyan(),
        "end a block with an empty line".dimmed()
    );
    println!("Type {} to exit, {} for help\n", "exit".yellow(), "help".yellow());

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("{}: cannot start REPL: {}", "error".red(), e);
            process::exit(1);
        }
    };

    let mut interpreter = Interpreter::new(config);
    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "n8>" } else { "..." };
        match rl.readline(&format!("{} ", prompt.green().bold())) {
            Ok(line) => {
                if buffer.is_empty() {
                    match line.trim() {
                        "" => continue,
                        "exit" | "quit" => {
                            println!("{}", "Goodbye!".cyan());
                            break;
                        }
                        "help" => {
                            print_repl_help();
                            continue;
                        }
                        "clear" => {
                            interpreter = Interpreter::new(interpreter.config().clone());
                            println!("{}", "State cleared.".dimmed());
                            continue;
                        }
                        command if command.starts_with("load ") => {
                            let _ = rl.add_history_entry(line.as_str());
                            load_file(&mut interpreter, Path::new(command["load ".len()..].trim()));
                            continue;
                        }
                        _ => {}
                    }
                }

                let _ = rl.add_history_entry(line.as_str());

                // Lines ending in ':' open a block that runs once a blank line closes it
                let opens_block = line.trim_end().ends_with(':');
                if !line.trim().is_empty() {
                    buffer.push_str(&line);
                    buffer.push('\n');
                    if opens_block || line.starts_with(' ') {
                        continue;
                    }
                }

                let source = std::mem::take(&mut buffer);
                evaluate_input(&mut interpreter, &source);
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                println!("{}", "^C".dimmed());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".cyan());
                break;
            }
            Err(err) => {
                eprintln!("{}: {:?}", "error".red(), err);
                break;
            }
        }
    }
}

/// Run a script file inside the REPL session, keeping its bindings
fn load_file(interpreter: &mut Interpreter, path: &Path) {
    match fs::read_to_string(path) {
        Ok(source) => {
            println!("{} {}", "Loading".dimmed(), path.display());
            evaluate_input(interpreter, &source);
        }
        Err(e) => eprintln!("{}: cannot read file '{}': {}", "error".red(), path.display(), e),
    }
}

fn evaluate_input(interpreter: &mut Interpreter, source: &str) {
    let program = match nair8::parse(source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e.with_source(source).to_string().red());
            return;
        }
    };

    let result = interpreter.interpret(&program);
    for line in interpreter.take_output() {
        println!("{} {}", "=>".dimmed(), line.cyan());
    }
    if let Err(e) = result {
        eprintln!("{}", Error::from(e).with_source(source).to_string().red());
    }
}

fn print_repl_help() {
    println!("{}", "REPL Commands:".yellow());
    println!("  exit, quit   Exit the REPL");
    println!("  clear        Forget every binding and Object type");
    println!("  load <path>  Run a script file in this session");
    println!("  help         Show this help\n");
    println!("{}", "Language Examples:".yellow());
    println!("  x as Whole is 10");
    println!("  x is x + 1");
    println!("  show \"x is {{x}}\"");
    println!("  Job double requires n as Whole returning Whole:");
    println!("      output n * 2");
}
