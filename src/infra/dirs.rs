//! Platform-specific directory management
//!
//! Provides the location of the persistent dependency cache.
//! Follows XDG Base Directory Specification on Linux and standard locations on macOS.
//!
//! The `POLYBUILD_CACHE_DIR` environment variable overrides the default.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the cache directory
pub const ENV_CACHE_DIR: &str = "POLYBUILD_CACHE_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "polybuild";

/// Subdirectory holding per-kind dependency caches
const DEPENDENCY_CACHE_SUBDIR: &str = "deps";

/// Platform-specific directory provider for polybuild
#[derive(Debug, Clone)]
pub struct PolybuildDirs {
    cache_dir: PathBuf,
}

impl PolybuildDirs {
    /// Create a new `PolybuildDirs` instance
    ///
    /// Checks the environment first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve_cache_dir(),
        }
    }

    /// Use an explicit cache directory
    #[must_use]
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Get the cache directory path
    ///
    /// - Linux: `$XDG_CACHE_HOME/polybuild` or `~/.cache/polybuild`
    /// - macOS: `~/Library/Caches/polybuild`
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Root of the per-kind dependency caches
    #[must_use]
    pub fn dependency_cache_dir(&self) -> PathBuf {
        self.cache_dir.join(DEPENDENCY_CACHE_SUBDIR)
    }

    fn resolve_cache_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CACHE_DIR) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        Self::platform_cache_dir()
    }

    fn platform_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                // Fallback to home directory
                dirs::home_dir()
                    .map(|h| h.join(".cache").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".cache").join(APP_NAME))
            })
    }
}

impl Default for PolybuildDirs {
    fn default() -> Self {
        Self::new()
    }
}
