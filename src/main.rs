use std::process::ExitCode;

use clap::Parser;
use maskcanvas::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Session log (overwrites the previous run's log)
    match &args.log {
        Some(path) => logger::init_at(path),
        None => logger::init(),
    }

    cli::run(args)
}
