//! Trellis command line entry point

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use trellis_cli::{Args, CliConfig, describe_error, run};

fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match CliConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    match run(&config) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            let query = config.query.read().unwrap_or_default();
            eprintln!("{}", describe_error(&e, &query));
            std::process::exit(1);
        }
    }
}
