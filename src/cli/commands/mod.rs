//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod cache;
pub mod check;
pub mod doctor;
pub mod plan;

use anyhow::Result;
use clap::Subcommand;
use std::path::{Path, PathBuf};

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build all services in dependency order
    Build {
        /// Maximum number of services built at once
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Stop starting new services after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Write the JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Build only these services and their dependencies
        #[arg(long, value_name = "NAME")]
        only: Vec<String>,
    },

    /// Validate the manifest and dependency graph without building
    Check,

    /// Show the build layers
    Plan,

    /// Inspect dependency caches
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Check that the build toolchains are installed
    Doctor,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Print the cache directory of each build kind
    Path,
    /// Show cache sizes
    Info,
}

impl Commands {
    /// Execute the command against the manifest at `manifest`
    pub async fn run(self, manifest: &Path) -> Result<()> {
        match self {
            Self::Build {
                jobs,
                fail_fast,
                report,
                only,
            } => {
                let options = crate::core::orchestrator::RunOptions {
                    jobs,
                    fail_fast,
                    only,
                };
                build::execute(manifest, options, report.as_deref()).await
            }
            Self::Check => check::execute(manifest),
            Self::Plan => plan::execute(manifest),
            Self::Cache { command } => match command {
                CacheCommands::Path => cache::execute_path(manifest),
                CacheCommands::Info => cache::execute_info(manifest),
            },
            Self::Doctor => doctor::execute(manifest),
        }
    }
}
