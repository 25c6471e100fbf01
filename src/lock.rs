//! Advisory per-package install lock.
//!
//! The lock is a file created exclusively next to the package's work folder.
//! It records the holder's pid on the first line and a description of the
//! holder's command on the second, so that a lock left behind by a dead
//! process can be recognized and taken over.

use anyhow::Result;
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runtime::Runtime;

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Another live process holds the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockContention {
    pub path: PathBuf,
    pub holder: Option<u32>,
}

impl fmt::Display for LockContention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.holder {
            Some(pid) => write!(
                f,
                "Lock {} is held by another process (pid {})",
                self.path.display(),
                pid
            ),
            None => write!(f, "Lock {} is held by another process", self.path.display()),
        }
    }
}

impl std::error::Error for LockContention {}

/// What a lock file says about its holder.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Holder {
    /// File exists but has no content yet: its creator is still writing it.
    Pending,
    Pid(u32),
    Unreadable,
}

fn parse_holder(content: &str) -> Holder {
    if content.trim().is_empty() {
        return Holder::Pending;
    }
    let first = content.lines().next().unwrap_or("").trim();
    match first.parse::<u32>() {
        Ok(pid) => Holder::Pid(pid),
        Err(_) => Holder::Unreadable,
    }
}

/// Holder of the lock at `path`, with the raw content it was judged from.
fn read_lock(runtime: &dyn Runtime, path: &Path) -> Option<(Holder, String)> {
    if !runtime.exists(path) {
        return None;
    }
    match runtime.read_to_string(path) {
        Ok(content) => Some((parse_holder(&content), content)),
        Err(_) => Some((Holder::Unreadable, String::new())),
    }
}

fn read_holder(runtime: &dyn Runtime, path: &Path) -> Option<Holder> {
    read_lock(runtime, path).map(|(holder, _)| holder)
}

/// Move a stale lock out of the way, provided it still holds `seen`.
///
/// The lock is renamed to a name private to this process first, so two
/// processes racing for the same stale lock can't both remove it. If the
/// moved file turns out to be a fresh lock, it is put back.
fn take_over(runtime: &dyn Runtime, path: &Path, seen: &str) -> bool {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".stale-{}", runtime.process_id()));
    let aside = PathBuf::from(aside);

    if let Err(e) = runtime.rename(path, &aside) {
        debug!("Could not move stale lock {}: {:#}", path.display(), e);
        return false;
    }
    let moved = runtime.read_to_string(&aside).unwrap_or_default();
    let cleared = moved == seen;
    if !cleared {
        debug!("Lock {} changed hands, restoring it", path.display());
        match runtime.create_new(path, moved.as_bytes()) {
            Ok(true) => {}
            Ok(false) => warn!("Lock {} was re-created meanwhile", path.display()),
            Err(e) => warn!("Failed to restore lock {}: {:#}", path.display(), e),
        }
    }
    if let Err(e) = runtime.remove_file(&aside) {
        warn!("Failed to delete {}: {:#}", aside.display(), e);
    }
    cleared && !runtime.exists(path)
}

/// Guard for an acquired lock. The lock file is removed on drop.
pub struct InstallLock<'a> {
    runtime: &'a dyn Runtime,
    path: PathBuf,
    contents: String,
}

impl fmt::Debug for InstallLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallLock")
            .field("path", &self.path)
            .finish()
    }
}

impl<'a> InstallLock<'a> {
    /// Acquire the lock at `path`, waiting at most `timeout`.
    /// Locks whose recorded holder is no longer running are taken over.
    /// With `dryrun`, a stale lock is left on disk and treated as acquired.
    #[tracing::instrument(skip(runtime))]
    pub async fn acquire(
        runtime: &'a dyn Runtime,
        path: &Path,
        holder: &str,
        timeout: Duration,
        dryrun: bool,
    ) -> Result<Self> {
        Self::acquire_with(runtime, path, holder, timeout, dryrun, |pid| {
            !runtime.process_alive(pid)
        })
        .await
    }

    /// Same as [`InstallLock::acquire`], with a custom staleness predicate on the holder's pid.
    pub async fn acquire_with<F>(
        runtime: &'a dyn Runtime,
        path: &Path,
        holder: &str,
        timeout: Duration,
        dryrun: bool,
        is_stale: F,
    ) -> Result<Self>
    where
        F: Fn(u32) -> bool,
    {
        if let Some(parent) = path.parent()
            && !runtime.is_dir(parent)
        {
            runtime.create_dir_all(parent)?;
        }

        let contents = format!("{}\n{}\n", runtime.process_id(), holder);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if runtime.create_new(path, contents.as_bytes())? {
                debug!("Acquired lock {}", path.display());
                return Ok(Self {
                    runtime,
                    path: path.to_path_buf(),
                    contents,
                });
            }

            let Some((recorded, seen)) = read_lock(runtime, path) else {
                continue;
            };
            let stale = match recorded {
                Holder::Pending => false,
                Holder::Unreadable => true,
                Holder::Pid(pid) => is_stale(pid),
            };
            if stale {
                if dryrun {
                    info!("Would take over stale lock {}", path.display());
                    return Ok(Self {
                        runtime,
                        path: path.to_path_buf(),
                        contents,
                    });
                }
                info!("Removing stale lock {}", path.display());
                if take_over(runtime, path, &seen) {
                    continue;
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                let holder = match recorded {
                    Holder::Pid(pid) => Some(pid),
                    _ => None,
                };
                return Err(LockContention {
                    path: path.to_path_buf(),
                    holder,
                }
                .into());
            }

            tokio::time::sleep(backoff.min(deadline - now)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// True when `path` is a lock held by a live process.
    pub fn is_held(runtime: &dyn Runtime, path: &Path) -> bool {
        match read_holder(runtime, path) {
            None | Some(Holder::Unreadable) => false,
            Some(Holder::Pending) => true,
            Some(Holder::Pid(pid)) => runtime.process_alive(pid),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLock<'_> {
    fn drop(&mut self) {
        // Only our own lock is released, never one that replaced it.
        match self.runtime.read_to_string(&self.path) {
            Ok(content) if content == self.contents => {}
            _ => return,
        }
        match self.runtime.remove_file(&self.path) {
            Ok(()) => debug!("Released lock {}", self.path.display()),
            Err(e) => warn!("Failed to release lock {}: {}", self.path.display(), e),
        }
    }
}
