use std::process;

use clap::Parser;
use kidtutor::commands::ask::{self, AskArgs};

#[derive(Debug, Parser)]
#[command(
    name = "kidask",
    about = "Ask the kid-safe AI teacher one question",
    version = kidtutor::VERSION
)]
struct Cli {
    #[command(flatten)]
    ask: AskArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = ask::run(cli.ask).await {
        eprintln!("{err}");
        process::exit(1);
    }
}
