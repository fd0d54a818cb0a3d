use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = hardenctl::cli::Cli::parse();
    hardenctl::logging::init(cli.verbose);

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(hardenctl::cli::exit_code(&e))
        }
    }
}
