use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    diagnostics::Diagnostic,
    runner::{CompileOptions, EXIT_FAILURE, GenerationEngine, Runner},
};

mod backend;
mod diagnostics;
mod error;
mod frontend;
mod index;
mod middle;
mod runner;

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_files: Vec<PathBuf>,

    /// Print the generated LIR of every unit that compiles
    #[arg(long)]
    emit_lir: bool,

    /// Log compiler internals at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    let options = CompileOptions {
        emit_lir: args.emit_lir,
    };
    let mut engine = GenerationEngine::new();
    let mut exit_code = 0;

    for source_file in args.source_files {
        let runner = match Runner::new(&mut engine, &source_file, options.clone()) {
            Ok(runner) => runner,
            Err(error) => {
                eprintln!("{}", Diagnostic::from(error));
                exit_code = exit_code.max(EXIT_FAILURE);
                continue;
            }
        };

        let result = runner.run(&mut engine);

        for diagnostic in &result.diagnostics {
            eprintln!("{diagnostic}");
        }

        info!(path = %result.pathname.display(), succeeded = result.succeeded, "compiled");
        exit_code = exit_code.max(result.exit_code);
    }

    ExitCode::from(u8::try_from(exit_code).unwrap_or(u8::MAX))
}
