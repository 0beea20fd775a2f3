use anyhow::Result;
use balance_ledger::cli::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    balance_ledger::telemetry::init(cli.verbose);
    cli.run().await
}
