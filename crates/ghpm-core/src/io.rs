use crate::error::Result;
use std::path::Path;

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Create the parent directory of a file path if it has one.
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_parent_handles_bare_filenames() {
        ensure_parent(Path::new("ghpm.db")).unwrap();
        let dir = TempDir::new().unwrap();
        let db = dir.path().join(".ghpm/ghpm.db");
        ensure_parent(&db).unwrap();
        assert!(dir.path().join(".ghpm").is_dir());
    }
}
