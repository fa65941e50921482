use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use simsweep_exp::Ledger;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Ledger document to inspect.
    #[arg(long)]
    pub ledger: PathBuf,
}

pub fn run(args: &StatusArgs) -> Result<(), Box<dyn Error>> {
    let ledger = Ledger::open(&args.ledger)?;
    let status = ledger.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
