//! CLI command for `polybuild cache`
//!
//! Shows where each build kind keeps its dependency cache and how large it is.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, print_warning};
use crate::core::cache::CacheCoordinator;
use crate::core::manifest::Manifest;
use crate::core::orchestrator::Project;
use crate::infra::dirs::PolybuildDirs;

/// Coordinator for the manifest's namespace, or the default one without a manifest
fn coordinator(manifest_path: &Path) -> Result<CacheCoordinator> {
    let dirs = PolybuildDirs::new();
    if !manifest_path.exists() {
        return Ok(CacheCoordinator::from_dirs(
            &dirs,
            Manifest::default().build.cache_namespace,
        ));
    }
    let project = Project::load(manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;
    Ok(project.cache(&dirs))
}

/// Execute cache path subcommand
pub fn execute_path(manifest_path: &Path) -> Result<()> {
    let cache = coordinator(manifest_path)?;

    if is_json() {
        let paths: serde_json::Map<String, serde_json::Value> = cache
            .info()
            .into_iter()
            .map(|info| (info.kind.to_string(), info.path.display().to_string().into()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    for info in cache.info() {
        println!("{:<6} {}", info.kind, info.path.display());
    }
    Ok(())
}

/// Execute cache info subcommand
pub fn execute_info(manifest_path: &Path) -> Result<()> {
    let cache = coordinator(manifest_path)?;
    let infos = cache.info();

    if is_json() {
        let json: Vec<_> = infos
            .iter()
            .map(|info| {
                serde_json::json!({
                    "kind": info.kind,
                    "path": info.path,
                    "exists": info.exists,
                    "size_bytes": info.size_bytes,
                    "items": info.item_count,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("Cache root: {}\n", cache.root().display());
    for info in &infos {
        println!("{}:", info.kind);
        println!("  Location: {}", info.path.display());
        if info.exists {
            println!("  Size: {}", info.format_size());
            println!("  Items: {}", info.item_count);
        } else {
            print_warning("  Cache directory does not exist yet");
        }
    }
    Ok(())
}
