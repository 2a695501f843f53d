mod cli;

use clap::Parser;

fn main() {
    env_logger::init();

    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli) {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
