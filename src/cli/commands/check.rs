//! Check command implementation
//!
//! Implements `polybuild check` to validate the manifest and dependency graph
//! without building anything.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, is_quiet, print_detail, print_success, print_warning};
use crate::core::orchestrator::Project;

/// Execute the check command
pub fn execute(manifest_path: &Path) -> Result<()> {
    let project = Project::load(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;
    let graph = project
        .graph(&[])
        .context("Failed to build dependency graph")?;

    let missing_dirs: Vec<String> = graph
        .nodes()
        .iter()
        .filter(|d| !d.workdir.is_dir())
        .map(|d| format!("{}: {}", d.name, d.workdir.display()))
        .collect();

    if is_json() {
        let json = serde_json::json!({
            "status": "valid",
            "services": graph.len(),
            "layers": graph.layer_names(),
            "max_parallelism": graph.max_parallelism(),
            "missing_directories": missing_dirs,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }
    if is_quiet() {
        return Ok(());
    }

    println!("Checking {}...\n", manifest_path.display());
    print_success(&format!("Manifest is valid ({} services)", graph.len()));
    print_success(&format!(
        "Dependency graph is acyclic ({} layers, up to {} services in parallel)",
        graph.layers().len(),
        graph.max_parallelism()
    ));

    println!("\nBuild layers:");
    for (i, layer) in graph.layer_names().iter().enumerate() {
        print_detail(&format!("{}: {}", i + 1, layer.join(", ")));
    }

    if !missing_dirs.is_empty() {
        println!();
        print_warning("Service directories not found:");
        for dir in &missing_dirs {
            print_detail(&format!("• {dir}"));
        }
    }

    Ok(())
}
