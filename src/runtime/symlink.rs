//! Symlink operations (create, inspect, remove).

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn symlink_impl(&self, original: &Path, link: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::symlink as unix_symlink;
            unix_symlink(original, link).context("Failed to create symlink")?;
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::{symlink_dir, symlink_file};

            // `is_dir()` on a relative path is relative to CWD; we want it relative to the link's parent.
            let target_path = if original.is_absolute() {
                original.to_path_buf()
            } else {
                link.parent()
                    .context("Failed to get parent directory for symlink")?
                    .join(original)
            };

            if target_path.is_dir() {
                symlink_dir(original, link).context("Failed to create directory symlink")?;
            } else {
                symlink_file(original, link).context("Failed to create file symlink")?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_symlink_impl(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_symlink_impl(&self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            fs::remove_file(path).context("Failed to remove symlink")?;
        }
        #[cfg(windows)]
        {
            // Directory symlinks need remove_dir, file symlinks need remove_file
            fs::remove_dir(path)
                .or_else(|_| fs::remove_file(path))
                .context("Failed to remove symlink")?;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_real_runtime_symlink_ops() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let target = dir.path().join("foo-1.0");
        runtime.write(&target, b"content").unwrap();

        let link = dir.path().join("foo");
        runtime.symlink(&target, &link).unwrap();
        assert!(runtime.is_symlink(&link));
        assert!(!runtime.is_symlink(&target));
        assert_eq!(std::fs::read_link(&link).unwrap(), target);
        assert_eq!(runtime.read_to_string(&link).unwrap(), "content");

        runtime.remove_symlink(&link).unwrap();
        assert!(!runtime.exists(&link));
        assert!(runtime.exists(&target));
    }

    #[test]
    fn test_dangling_symlink_is_still_a_symlink() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let link = dir.path().join("foo");
        runtime
            .symlink(&PathBuf::from("does-not-exist"), &link)
            .unwrap();

        assert!(runtime.is_symlink(&link));
        assert!(!runtime.exists(&link));
        assert!(runtime.modified(&link).is_ok());
    }
}
