//! Plan command implementation
//!
//! Implements `polybuild plan`, printing the topological layers and each
//! service's dependencies.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, is_quiet};
use crate::core::orchestrator::Project;

/// Execute the plan command
pub fn execute(manifest_path: &Path) -> Result<()> {
    let project = Project::load(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;
    let graph = project
        .graph(&[])
        .context("Failed to build dependency graph")?;

    if is_json() {
        let services: Vec<_> = graph
            .nodes()
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "kind": d.kind,
                    "depends_on": d.dependencies,
                    "required": d.required,
                })
            })
            .collect();
        let json = serde_json::json!({
            "layers": graph.layer_names(),
            "max_parallelism": graph.max_parallelism(),
            "services": services,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }
    if is_quiet() {
        return Ok(());
    }

    for (i, layer) in graph.layers().iter().enumerate() {
        println!("Layer {}:", i + 1);
        for &node in layer {
            let service = graph.node(node);
            if service.dependencies.is_empty() {
                println!("  • {} ({})", service.name, service.kind);
            } else {
                println!(
                    "  • {} ({}) <- {}",
                    service.name,
                    service.kind,
                    service.dependencies.join(", ")
                );
            }
        }
    }

    Ok(())
}
