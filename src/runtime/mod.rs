//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over system operations,
//! enabling dependency injection and testability.
//!
//! # Structure
//!
//! - `path` - Path utility functions (normalize, is_path_under, relative_symlink_path)
//! - `env` - Environment variables, directories and process liveness
//! - `fs` - File system operations (read, write, directory, timestamps)
//! - `symlink` - Symlink operations (create, inspect, remove)
//! - `dryrun` - Decorator that logs mutations instead of performing them

mod dryrun;
mod env;
mod fs;
pub mod path;
mod symlink;

use anyhow::{Context, Result};
use std::env as std_env;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use dryrun::DryRun;
pub use path::{is_path_under, relative_symlink_path};

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> Result<u64>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_symlink(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_symlink(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn symlink(&self, original: &Path, link: &Path) -> Result<()>;
    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>>;

    /// Last modification time, without following a trailing symlink.
    fn modified(&self, path: &Path) -> Result<SystemTime>;

    /// Atomically create `path` with `contents`.
    /// Returns Ok(false) if the file already exists.
    fn create_new(&self, path: &Path, contents: &[u8]) -> Result<bool>;

    /// Set file permissions (mode) on Unix systems. No-op on Windows.
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()>;

    // Directories
    fn home_dir(&self) -> Option<PathBuf>;

    // Processes
    fn process_id(&self) -> u32;
    fn process_alive(&self, pid: u32) -> bool;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<u64> {
        self.copy_impl(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_file_impl(path)
    }

    fn remove_symlink(&self, path: &Path) -> Result<()> {
        self.remove_symlink_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.is_symlink_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.read_dir_impl(path)
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        self.symlink_impl(original, link)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.open_impl(path)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        self.modified_impl(path)
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> Result<bool> {
        self.create_new_impl(path, contents)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        self.set_permissions_impl(path, mode)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_impl()
    }

    fn process_id(&self) -> u32 {
        std::process::id()
    }

    fn process_alive(&self, pid: u32) -> bool {
        self.process_alive_impl(pid)
    }
}

/// Delete whatever lives at `path`: symlink, file or folder.
/// Missing paths are not an error.
pub fn delete_path<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<()> {
    if runtime.is_symlink(path) {
        runtime.remove_symlink(path)
    } else if runtime.is_dir(path) {
        runtime.remove_dir_all(path)
    } else if runtime.exists(path) {
        runtime.remove_file(path)
    } else {
        Ok(())
    }
    .with_context(|| format!("Failed to delete {}", path.display()))
}

/// Write a file via a temporary sibling and rename it into place.
pub fn write_atomic<R: Runtime + ?Sized>(runtime: &R, path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !runtime.exists(parent)
    {
        runtime.create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    runtime.write(&tmp, contents)?;
    runtime
        .rename(&tmp, path)
        .with_context(|| format!("Failed to save {}", path.display()))
}
