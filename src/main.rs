use std::process::ExitCode;

use clap::Parser;
use stickerpaint::cli::{self, CliArgs};
use stickerpaint::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::init(args.verbose);

    cli::run(args)
}
