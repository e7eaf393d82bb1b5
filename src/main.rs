//! Polybuild CLI - Multi-language build orchestrator
//!
//! Entry point for the polybuild command-line application.

use clap::Parser;

use polybuild::cli::output::{display_error, OutputConfig};
use polybuild::cli::Cli;
use polybuild::error::{exit_code_for, EXIT_SUCCESS};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Apply output configuration globally
    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);
    output_config.apply_global();

    // RUST_LOG takes precedence over -v/-q
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(output_config.log_level().into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the command and map errors to exit codes
    let code = match cli.run().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            display_error(&e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
