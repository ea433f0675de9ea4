use clap::Parser;
use dltidy::cli::{Cli, run_cli};
use dltidy::logging::init_logging;
use dltidy::output::OutputFormatter;
use std::io::IsTerminal;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        OutputFormatter::error(&format!("Error: {}", err));
        return ExitCode::FAILURE;
    }

    init_logging(cli.verbosity(), !cli.no_color && std::io::stderr().is_terminal());

    match run_cli(&cli) {
        Ok(status) => status.into(),
        Err(e) => {
            OutputFormatter::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}
