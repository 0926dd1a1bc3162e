use std::process::ExitCode;

use clap::Parser;
use tesoro::cli::{exit_status, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tesoro::telemetry::init(cli.verbose);

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}
