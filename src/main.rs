use std::io::{self, Write};

use clap::Parser;
use next_dev::cli::{self, Outcome};
use next_dev::config::{Cli, Command};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let outcome = match args.command {
        Command::Dev(dev_args) => cli::run_dev(dev_args).await,
    };

    if let Outcome::Fatal { code, message } = outcome {
        eprintln!("{message}");
        // Give buffered writes one tick to reach the terminal before the
        // process is torn down.
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        tokio::task::yield_now().await;
        std::process::exit(code);
    }
}
