use clap::Parser;
use datafetch_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // Initialize logging as early as possible; falls back to stderr.
    logging::init_logging(cli.verbose);

    if let Err(err) = cli.run().await {
        eprintln!("datafetch error: {:#}", err);
        std::process::exit(1);
    }
}
