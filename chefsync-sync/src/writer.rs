//! Content-gated atomic writes.
//!
//! ## `atomic_write` protocol
//!
//! 1. Content is produced by the caller.
//! 2. Compare with the bytes currently on disk → skip if identical.
//! 3. Write to `<path>.chefsync.tmp` in the same directory.
//! 4. Rename to the final path (atomic on POSIX).
//!
//! Bytes are written exactly as given; no line-ending normalization, so a
//! rewritten metadata file keeps every byte the caller did not change.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped: content on disk already matches.
    Unchanged { path: PathBuf },
}

/// Atomically replace `path` with `content` unless it already holds it.
pub(crate) fn atomic_write(path: &Path, content: &str) -> Result<WriteResult, SyncError> {
    let tmp = PathBuf::from(format!("{}.chefsync.tmp", path.display()));
    atomic_write_with_tmp(path, content, &tmp)
}

fn atomic_write_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<WriteResult, SyncError> {
    match std::fs::read(path) {
        Ok(existing) if existing == content.as_bytes() => {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(path, err)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::debug!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn first_write_returns_written() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ops.json");
        let result = atomic_write(&path, "{}").unwrap();
        assert!(matches!(result, WriteResult::Written { .. }));
        assert!(path.exists());
    }

    #[test]
    fn same_content_returns_unchanged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ops.json");
        atomic_write(&path, "same").unwrap();
        let result = atomic_write(&path, "same").unwrap();
        assert!(matches!(result, WriteResult::Unchanged { .. }));
    }

    #[test]
    fn crlf_bytes_are_preserved() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.rb");
        atomic_write(&path, "name 'x'\r\nversion '1.0.0'\r\n").unwrap();
        assert_eq!(
            fs::read(&path).unwrap(),
            b"name 'x'\r\nversion '1.0.0'\r\n".to_vec()
        );
    }

    #[test]
    fn creates_parent_directories_and_cleans_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("environments").join("ops.json");
        atomic_write(&path, "{}").unwrap();
        assert!(path.exists());
        let tmp_path = PathBuf::from(format!("{}.chefsync.tmp", path.display()));
        assert!(!tmp_path.exists(), ".chefsync.tmp must be cleaned up");
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("metadata.rb");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("metadata.rb.chefsync.tmp");

        let result = atomic_write_with_tmp(&path, "new content", &tmp_path);

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        // Running as root bypasses directory permissions; only assert when
        // the rename was actually refused.
        if result.is_err() {
            assert_eq!(fs::read_to_string(&path).unwrap(), "original");
            assert!(!tmp_path.exists(), ".chefsync.tmp should be cleaned up");
        }
    }
}
