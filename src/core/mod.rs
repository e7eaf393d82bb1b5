//! Core business logic module
//!
//! This module contains the build orchestration engine. Process spawning,
//! directory lookup and tool discovery belong in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`descriptor`] - Service descriptors and artifact rules
//! - [`manifest`] - Manifest (polybuild.toml) parsing and validation
//! - [`registry`] - Service descriptor registry
//! - [`graph`] - Dependency graph and topological layers
//! - [`adapter`] - Per-kind toolchain command plans
//! - [`runner`] - Per-service stage sequence
//! - [`scheduler`] - Bounded-parallel graph execution
//! - [`report`] - Result aggregation and run report
//! - [`cache`] - Per-kind dependency cache directories
//! - [`events`] - Structured build events
//! - [`orchestrator`] - End-to-end run wiring
//! - [`doctor`] - Toolchain availability checks

pub mod adapter;
pub mod cache;
pub mod descriptor;
pub mod doctor;
pub mod events;
pub mod graph;
pub mod manifest;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod result;
pub mod runner;
pub mod scheduler;
