use clap::Parser;
use rangefetch_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    // `.env` values become process environment; real env vars win.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging as early as possible.
    if let Err(err) = logging::init_logging(cli.verbose) {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr: {:#}", err);
    }

    if let Err(err) = cli.run().await {
        eprintln!("rangefetch error: {:#}", err);
        std::process::exit(1);
    }
}
