//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::defaults;
use commands::Commands;

/// Polybuild - Multi-language build orchestrator
///
/// Build Maven, Go and Node.js services in dependency order.
#[derive(Parser, Debug)]
#[command(name = "polybuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the manifest
    #[arg(
        long,
        global = true,
        env = "POLYBUILD_MANIFEST",
        default_value = defaults::MANIFEST_FILE
    )]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        if let Some(cmd) = self.command {
            cmd.run(&self.manifest).await
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::CacheCommands;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::try_parse_from([
            "polybuild", "build", "--jobs", "2", "--fail-fast", "--only", "ui", "--only", "cart",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Build {
                jobs,
                fail_fast,
                only,
                report,
            }) => {
                assert_eq!(jobs, Some(2));
                assert!(fail_fast);
                assert_eq!(only, vec!["ui", "cart"]);
                assert!(report.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "polybuild", "cache", "info", "--json", "--manifest", "svc/polybuild.toml",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.manifest, PathBuf::from("svc/polybuild.toml"));
        assert!(matches!(
            cli.command,
            Some(Commands::Cache {
                command: CacheCommands::Info
            })
        ));
    }
}
