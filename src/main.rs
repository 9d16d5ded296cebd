use clap::Parser;
use safewrite::cli::{Cli, Output};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = cli.run() {
        Output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
