use std::error::Error;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{
    single::{self, SingleArgs},
    status::{self, StatusArgs},
    sweep::{self, SweepArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "simsweep",
    version,
    about = "Resumable cache/branch-predictor sweep driver for an external simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every combination not yet recorded in the ledger.
    Sweep(SweepArgs),
    /// Run exactly one combination without touching a ledger.
    Single(SingleArgs),
    /// Print ledger progress as JSON.
    Status(StatusArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result: Result<(), Box<dyn Error>> = match cli.command {
        Command::Sweep(args) => sweep::run(&args),
        Command::Single(args) => single::run(&args),
        Command::Status(args) => status::run(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
