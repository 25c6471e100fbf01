//! Environment, directories and process liveness.

use std::env;
use std::path::PathBuf;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn env_var_impl(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn home_dir_impl(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn process_alive_impl(&self, pid: u32) -> bool {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::kill;
            use nix::unistd::Pid;

            let Ok(raw) = i32::try_from(pid) else {
                return false;
            };
            if raw <= 0 {
                return false;
            }
            // Signal 0 only checks for existence; EPERM still means the process exists
            match kill(Pid::from_raw(raw), None) {
                Ok(()) => true,
                Err(Errno::EPERM) => true,
                Err(_) => false,
            }
        }

        #[cfg(not(unix))]
        {
            pid != 0
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};

    #[test]
    fn test_real_runtime_env_and_dirs() {
        let runtime = RealRuntime;

        assert!(runtime.env_var("PATH").is_ok());

        let home = runtime.home_dir();
        assert!(home.is_some() || cfg!(target_os = "linux"));
    }

    #[test]
    fn test_process_alive() {
        let runtime = RealRuntime;
        assert!(runtime.process_alive(runtime.process_id()));
        assert!(!runtime.process_alive(0));
    }
}
