//! Polybuild - Multi-language build orchestrator
//!
//! This library builds a set of Maven, Go and Node.js services in dependency
//! order with bounded parallelism, isolating failures per service and
//! reporting one result per service.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Graph, scheduling, stage execution and reporting
//! - [`infra`] - Infrastructure layer (processes, directories, toolchains)
//! - [`config`] - Configuration defaults
//! - [`error`] - Error types and exit codes

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
