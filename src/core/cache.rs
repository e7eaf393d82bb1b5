//! Dependency cache coordination
//!
//! Each build kind gets its own directory under
//! `<cache root>/<namespace>/<kind>`, shared by every service of that kind
//! and persisted across runs. Directories are never evicted here; pruning
//! happens outside the orchestrator.

use std::path::{Path, PathBuf};

use crate::core::descriptor::BuildKind;
use crate::error::CacheError;
use crate::infra::dirs::PolybuildDirs;

/// Address of one cache directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Build kind owning the cache
    pub kind: BuildKind,
    /// Namespace separating unrelated cache sets
    pub namespace: String,
}

/// Size information for one cache directory
#[derive(Debug)]
pub struct CacheInfo {
    /// Build kind
    pub kind: BuildKind,
    /// Cache directory path
    pub path: PathBuf,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Number of cached files
    pub item_count: usize,
    /// Whether the directory exists
    pub exists: bool,
}

impl CacheInfo {
    /// Format size for display
    #[allow(clippy::cast_precision_loss)]
    pub fn format_size(&self) -> String {
        if self.size_bytes < 1024 {
            format!("{} bytes", self.size_bytes)
        } else if self.size_bytes < 1024 * 1024 {
            format!("{:.1} KB", self.size_bytes as f64 / 1024.0)
        } else if self.size_bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", self.size_bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!(
                "{:.1} GB",
                self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
            )
        }
    }
}

/// Hands out per-kind cache directories
#[derive(Debug, Clone)]
pub struct CacheCoordinator {
    root: PathBuf,
    namespace: String,
}

impl CacheCoordinator {
    /// Coordinator rooted at `root`
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
        }
    }

    /// Coordinator rooted at the platform cache directory
    pub fn from_dirs(dirs: &PolybuildDirs, namespace: impl Into<String>) -> Self {
        Self::new(dirs.dependency_cache_dir(), namespace)
    }

    /// Cache root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Key for `kind` in this coordinator's namespace
    pub fn key(&self, kind: BuildKind) -> CacheKey {
        CacheKey {
            kind,
            namespace: self.namespace.clone(),
        }
    }

    /// Directory addressed by `key`; does not touch the filesystem
    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.namespace).join(key.kind.as_str())
    }

    /// Return the cache directory for `kind`, creating it if absent
    ///
    /// Safe to call concurrently: directory creation is idempotent and a
    /// racing creator is not an error. Write safety inside the directory is
    /// left to the tool's own locking.
    pub fn acquire(&self, kind: BuildKind) -> Result<PathBuf, CacheError> {
        let path = self.path(&self.key(kind));
        std::fs::create_dir_all(&path).map_err(|e| CacheError::CreateDir {
            path: path.clone(),
            error: e.to_string(),
        })?;
        tracing::trace!(kind = %kind, path = %path.display(), "Acquired cache directory");
        Ok(path)
    }

    /// Size report for every build kind
    pub fn info(&self) -> Vec<CacheInfo> {
        BuildKind::ALL
            .iter()
            .map(|&kind| {
                let path = self.path(&self.key(kind));
                CacheInfo {
                    kind,
                    exists: path.is_dir(),
                    size_bytes: calculate_dir_size(&path),
                    item_count: count_items(&path),
                    path,
                }
            })
            .collect()
    }
}

/// Calculate directory size recursively
fn calculate_dir_size(path: &Path) -> u64 {
    if !path.exists() {
        return 0;
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Count files in directory
fn count_items(path: &Path) -> usize {
    if !path.exists() {
        return 0;
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_kinds_never_collide() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheCoordinator::new(tmp.path(), "default");
        let paths: HashSet<PathBuf> = BuildKind::ALL
            .iter()
            .map(|&k| cache.acquire(k).unwrap())
            .collect();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.is_dir()));
    }

    #[test]
    fn test_acquire_is_idempotent_across_coordinators() {
        let tmp = TempDir::new().unwrap();
        let first = CacheCoordinator::new(tmp.path(), "ci").acquire(BuildKind::Go).unwrap();
        std::fs::write(first.join("marker"), "x").unwrap();
        let second = CacheCoordinator::new(tmp.path(), "ci").acquire(BuildKind::Go).unwrap();
        assert_eq!(first, second);
        assert!(second.join("marker").exists(), "acquire must not wipe contents");
    }

    #[test]
    fn test_namespaces_are_separate() {
        let tmp = TempDir::new().unwrap();
        let a = CacheCoordinator::new(tmp.path(), "a").acquire(BuildKind::Node).unwrap();
        let b = CacheCoordinator::new(tmp.path(), "b").acquire(BuildKind::Node).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_info_reports_sizes() {
        let tmp = TempDir::new().unwrap();
        let cache = CacheCoordinator::new(tmp.path(), "default");
        let maven = cache.acquire(BuildKind::Maven).unwrap();
        std::fs::write(maven.join("a.jar"), vec![0u8; 2048]).unwrap();

        let info = cache.info();
        let maven_info = info.iter().find(|i| i.kind == BuildKind::Maven).unwrap();
        assert!(maven_info.exists);
        assert_eq!(maven_info.item_count, 1);
        assert_eq!(maven_info.format_size(), "2.0 KB");

        let go_info = info.iter().find(|i| i.kind == BuildKind::Go).unwrap();
        assert!(!go_info.exists);
        assert_eq!(go_info.format_size(), "0 bytes");
    }
}
