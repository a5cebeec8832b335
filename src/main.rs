//! Binary entry point for docrag.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use docrag::cli::output::{format_error, OutputFormat};
use docrag::cli::{execute, Cli};
use std::io::{self, Write};
use std::process::ExitCode;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("DOCRAG_LOG").unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);
    init_logging(cli.verbose);

    match execute(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                if let Err(e) = writeln!(io::stdout(), "{output}") {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        eprintln!("Error writing to stdout: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let error_output = format_error(&e, format);
            match format {
                OutputFormat::Json => println!("{error_output}"),
                OutputFormat::Text => eprintln!("Error: {error_output}"),
            }
            ExitCode::from(e.exit_code())
        }
    }
}
