//! Filesystem operations
//!
//! Handles writing run reports next to the workspace.

use std::path::Path;

use crate::error::PolybuildError;

/// Write content to a file, creating parent directories as needed
pub fn write_file(path: &Path, content: &str) -> Result<(), PolybuildError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PolybuildError::Io {
            path: parent.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    std::fs::write(path, content).map_err(|e| PolybuildError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("reports/run/report.json");
        write_file(&path, "{}").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }
}
