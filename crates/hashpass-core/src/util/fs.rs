//! Filesystem utilities.

use hashpass_types::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The user's home directory, or `.` when it cannot be determined.
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();

    if let Ok(stripped) = path.strip_prefix("~") {
        return home_dir().join(stripped);
    }

    path.to_path_buf()
}

/// A path next to `path` that does not exist yet.
///
/// The result looks like `<path>.<tag>-<uuid>` and lives in the same
/// directory, so a later rename stays on one filesystem.
pub fn unique_sibling(path: impl AsRef<Path>, tag: &str) -> PathBuf {
    let path = path.as_ref();
    loop {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{}-{}", tag, uuid::Uuid::new_v4()));
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            return candidate;
        }
    }
}

/// Write `contents` to `path` through a temporary sibling and a rename.
///
/// Readers see either the old file or the new one, never a partial write.
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = unique_sibling(path, "tmp");
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_path("~/store"), home_dir().join("store"));
        assert_eq!(expand_path("/abs/store"), PathBuf::from("/abs/store"));
        assert_eq!(expand_path("rel/~"), PathBuf::from("rel/~"));
    }

    #[test]
    fn test_unique_sibling_shares_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        let a = unique_sibling(&path, "backup");
        let b = unique_sibling(&path, "backup");

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir.path()));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("store.backup-"));
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
