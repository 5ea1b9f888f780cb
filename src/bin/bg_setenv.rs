use std::process::ExitCode;

use bgenv::cli::{self, SetenvArgs};

fn main() -> ExitCode {
    if std::env::args_os().len() < 2 {
        println!(
            "No task to perform. Please specify at least one optional argument. \
             See --help for further information."
        );
        return ExitCode::FAILURE;
    }

    let (args, intents) = match SetenvArgs::parse_ordered(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };
    cli::init_logging(args.verbose);

    let stdout = std::io::stdout();
    match cli::run_setenv(&args, &intents, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
