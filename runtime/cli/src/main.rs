mod external;

use lang::error::RillError;
use lang::interp::Interpreter;
use lang::lexer::Lexer;
use lang::parser::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use std::fs;
use std::io::Read;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut eval_script: Option<String> = None;
    let mut script_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                process::exit(0);
            }
            "-r" | "--repl" => {
                match run_repl() {
                    Ok(()) => process::exit(0),
                    Err(()) => process::exit(2),
                }
            }
            "-e" | "--eval" => {
                i += 1;
                if i < args.len() {
                    eval_script = Some(args[i].clone());
                } else {
                    eprintln!("Error: -e requires a script argument");
                    process::exit(1);
                }
            }
            arg if !arg.starts_with('-') => {
                script_path = Some(arg.to_string());
            }
            unknown => {
                eprintln!("Unknown option: {}", unknown);
                process::exit(1);
            }
        }
        i += 1;
    }

    // Determine source: -e > file > stdin
    let source: String = if let Some(script) = eval_script {
        script
    } else if let Some(path) = script_path {
        match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path, e);
                process::exit(1);
            }
        }
    } else if !atty::is(atty::Stream::Stdin) {
        let mut source = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut source) {
            eprintln!("Error reading from stdin: {}", e);
            process::exit(1);
        }
        source
    } else {
        print_help();
        process::exit(1);
    };

    match run_source(&source) {
        Ok(()) => process::exit(0),
        Err(()) => process::exit(2),
    }
}

fn print_help() {
    println!("rill language CLI");
    println!();
    println!("USAGE:");
    println!("    rill-cli <SCRIPT>     Run a script file");
    println!("    rill-cli -e <CODE>    Evaluate an inline script");
    println!("    rill-cli -r           Start the REPL");
    println!("    rill-cli -h           Show this help");
    println!("    cat file | rill-cli   Read a script from stdin");
}

fn run_source(source: &str) -> Result<(), ()> {
    let mut lexer = Lexer::new(source);
    let tokens = match lexer.tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("{}", RillError::Lex(e).format_with_source(source));
            return Err(());
        }
    };

    let mut parser = Parser::new(tokens);
    let program = match parser.parse_program() {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", RillError::Parse(e).format_with_source(source));
            return Err(());
        }
    };

    let mut interp = create_interpreter();
    if let Err(e) = interp.run(&program) {
        eprintln!("{}", RillError::Eval(e).format_with_source(source));
        return Err(());
    }

    Ok(())
}

fn run_repl() -> Result<(), ()> {
    println!("rill repl — print with '?', exit with Ctrl-D");

    let mut interp = create_interpreter();
    let mut editor = DefaultEditor::new().map_err(|e| {
        eprintln!("Failed to initialize REPL: {}", e);
    })?;

    loop {
        match editor.readline(">> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                editor.add_history_entry(&line).ok();

                let tokens = match Lexer::new(&line).tokenize() {
                    Ok(tokens) => tokens,
                    Err(e) => {
                        eprintln!("{}", RillError::Lex(e));
                        continue;
                    }
                };

                match Parser::new(tokens).parse_program() {
                    Ok(program) => {
                        if let Err(e) = interp.run(&program) {
                            eprintln!("{}", RillError::Eval(e));
                        }
                    }
                    Err(e) => eprintln!("{}", RillError::Parse(e)),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return Err(());
            }
        }
    }

    Ok(())
}

fn create_interpreter() -> Interpreter {
    let mut interp = Interpreter::new();
    external::install(&mut interp);
    interp
}
