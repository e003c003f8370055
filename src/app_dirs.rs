//! Toolkit home resolution anchored to a single `.shaperec` folder.
//!
//! Binaries resolve the project root and log directory here. `SHAPEREC_HOME`
//! points straight at a toolkit root for tests and portable setups; otherwise
//! the root lives under the OS config directory.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Name of the toolkit directory under the OS config root.
pub const APP_DIR_NAME: &str = ".shaperec";
/// Environment variable naming the toolkit root directly.
pub const HOME_ENV_VAR: &str = "SHAPEREC_HOME";

static HOME_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum AppDirError {
    /// Neither `SHAPEREC_HOME` nor an OS config directory is available.
    #[error("No toolkit home: set {HOME_ENV_VAR} or provide an OS config directory")]
    NoBaseDir,
    #[error("Failed to create toolkit directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Return the toolkit root holding `projects/`, creating it if needed.
pub fn toolkit_root() -> Result<PathBuf, AppDirError> {
    let path = home_dir().ok_or(AppDirError::NoBaseDir)?;
    create(path)
}

/// Return `<toolkit root>/logs`, creating it if needed.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    create(toolkit_root()?.join("logs"))
}

fn create(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn home_dir() -> Option<PathBuf> {
    if let Some(path) = HOME_OVERRIDE.lock().ok().and_then(|guard| guard.clone()) {
        return Some(path);
    }
    if let Ok(path) = std::env::var(HOME_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.config_dir().join(APP_DIR_NAME))
}

#[cfg(test)]
fn set_home_override(path: Option<PathBuf>) {
    let mut guard = HOME_OVERRIDE.lock().expect("home override mutex poisoned");
    *guard = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct OverrideGuard;

    impl OverrideGuard {
        fn set(path: PathBuf) -> Self {
            set_home_override(Some(path));
            Self
        }
    }

    impl Drop for OverrideGuard {
        fn drop(&mut self) {
            set_home_override(None);
        }
    }

    #[test]
    fn override_anchors_root_and_logs() {
        let base = tempdir().unwrap();
        let home = base.path().join("toolkit");
        let _guard = OverrideGuard::set(home.clone());
        assert_eq!(toolkit_root().unwrap(), home);
        let logs = logs_dir().unwrap();
        assert_eq!(logs, home.join("logs"));
        assert!(logs.is_dir());
    }
}
