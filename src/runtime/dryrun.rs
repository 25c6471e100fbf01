//! Dry-run decorator: reads pass through, mutations are logged instead of performed.

use anyhow::Result;
use log::{debug, info};
use std::env;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::Runtime;
use crate::process::{ProcessRunner, RunResult, describe};

/// Wraps a [`Runtime`] or [`ProcessRunner`] so that nothing on disk changes
/// and no state-altering program is spawned.
pub struct DryRun<T> {
    inner: T,
}

impl<T> DryRun<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<R: Runtime> Runtime for DryRun<R> {
    fn env_var(&self, key: &str) -> Result<String, env::VarError> {
        self.inner.env_var(key)
    }

    fn write(&self, path: &Path, _contents: &[u8]) -> Result<()> {
        info!("Would write {}", path.display());
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.inner.read_to_string(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        info!("Would move {} -> {}", from.display(), to.display());
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        info!("Would copy {} -> {}", from.display(), to.display());
        Ok(0)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        if !self.inner.is_dir(path) {
            info!("Would create folder {}", path.display());
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        info!("Would delete {}", path.display());
        Ok(())
    }

    fn remove_symlink(&self, path: &Path) -> Result<()> {
        info!("Would delete {}", path.display());
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        info!("Would delete {}", path.display());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.inner.is_symlink(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        info!("Would symlink {} -> {}", link.display(), original.display());
        Ok(())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.inner.open(path)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        self.inner.modified(path)
    }

    fn create_new(&self, path: &Path, _contents: &[u8]) -> Result<bool> {
        if self.inner.exists(path) {
            return Ok(false);
        }
        debug!("Would create {}", path.display());
        Ok(true)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        debug!("Would chmod {:o} {}", mode, path.display());
        Ok(())
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.inner.home_dir()
    }

    fn process_id(&self) -> u32 {
        self.inner.process_id()
    }

    fn process_alive(&self, pid: u32) -> bool {
        self.inner.process_alive(pid)
    }
}

impl<P: ProcessRunner> ProcessRunner for DryRun<P> {
    fn run(&self, program: &Path, args: &[String]) -> Result<RunResult> {
        info!("Would run: {}", describe(program, args));
        Ok(RunResult::default())
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        self.inner.which(program)
    }
}
