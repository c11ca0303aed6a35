// Entrypoint for the CLI application.
// - Keeps `main` small: set up logging, parse arguments and hand off to
//   `cli::run`.
// - Errors are printed once here and mapped to an exit code that tells
//   scripts what kind of failure happened.

use archive_upload_client::cli::{run, Cli};
use archive_upload_client::exit_codes::exit_code;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise -v / -vv raise the default level.
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        tracing::debug!(error = ?err, "command failed");
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code(&err));
    }
}
