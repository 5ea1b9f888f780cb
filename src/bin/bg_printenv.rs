use std::process::ExitCode;

use bgenv::cli::{self, PrintenvArgs};
use clap::Parser;

fn main() -> ExitCode {
    let args = PrintenvArgs::parse();
    cli::init_logging(args.verbose);

    let stdout = std::io::stdout();
    match cli::run_printenv(&args, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
