//! Scoped scratch workspaces.
//!
//! Every render gets a fresh, uniquely named directory for its intermediate
//! files. The directory is removed when [`ScratchDir`] is closed or dropped,
//! including when the owning task is cancelled mid-render.

use std::io;
use std::path::Path;

use tempfile::TempDir;

/// Prefix of scratch directory names.
const SCRATCH_PREFIX: &str = "texfig-";

/// Temporary directory owned by a single render.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a scratch directory under `root`, or the system temp dir.
    ///
    /// `root` is created if it does not exist.
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory, reporting any failure.
    ///
    /// Dropping a `ScratchDir` also removes it but ignores errors.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_under_root_and_close() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        let path = scratch.path().to_path_buf();

        assert!(path.starts_with(root.path()));
        assert!(path.is_dir());
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(SCRATCH_PREFIX)
        );

        std::fs::write(path.join("diagram.tex"), "x").unwrap();
        scratch.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchDir::create(Some(root.path())).unwrap();
            std::fs::write(scratch.path().join("diagram.pdf"), "x").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_unique_names() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchDir::create(Some(root.path())).unwrap();
        let b = ScratchDir::create(Some(root.path())).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_missing_root_is_created() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        let scratch = ScratchDir::create(Some(&nested)).unwrap();
        assert!(scratch.path().starts_with(&nested));
    }

    #[test]
    fn test_system_temp_dir() {
        let scratch = ScratchDir::create(None).unwrap();
        assert!(scratch.path().starts_with(std::env::temp_dir()));
    }
}
