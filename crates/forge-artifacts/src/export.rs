//! Atomic export of an artifact's code to a file.

use camino::Utf8Path;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::info;

use forge_utils::error::StoreError;

use crate::artifact::Artifact;

/// Write `artifact.code` to `path` via a temp file in the same directory,
/// fsync, then rename. Parent directories are created as needed.
///
/// # Errors
///
/// Returns `StoreError::Export` if any step fails; `path` is left as it was.
pub fn export_artifact(artifact: &Artifact, path: &Utf8Path) -> Result<(), StoreError> {
    let fail = |reason: String| StoreError::Export {
        path: path.to_string(),
        reason,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| fail(format!("cannot create {dir}: {e}")))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| fail(e.to_string()))?;
    temp.write_all(artifact.code.as_bytes())
        .map_err(|e| fail(e.to_string()))?;
    temp.as_file().sync_all().map_err(|e| fail(e.to_string()))?;
    temp.persist(path).map_err(|e| fail(e.error.to_string()))?;

    info!(path = %path, version = artifact.version, "Artifact exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_export_writes_code_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("out/page.html")).unwrap();
        let artifact = Artifact::new("<html></html>", 2, "refine: tweak");

        export_artifact(&artifact, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<html></html>");

        let newer = Artifact::new("<html>v3</html>", 3, "refine: again");
        export_artifact(&newer, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<html>v3</html>");
    }

    #[test]
    fn test_export_into_a_file_path_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let path = Utf8PathBuf::from_path_buf(blocker.join("page.html")).unwrap();

        let err = export_artifact(&Artifact::seed(), &path).unwrap_err();
        assert!(matches!(err, StoreError::Export { .. }));
    }
}
