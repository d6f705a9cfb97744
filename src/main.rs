use clap::Parser;
use std::process;
use tidywatch::cli::{self, Cli};
use tidywatch::output::OutputFormatter;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = cli::run(cli) {
        OutputFormatter::error(&format!("{e:#}"));
        process::exit(1);
    }
}

/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn,tidywatch=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
