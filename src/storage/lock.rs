use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Exclusive per-app run lock, released when dropped.
#[derive(Debug)]
pub struct AppLock {
    file: File,
    path: PathBuf,
}

impl AppLock {
    pub fn acquire<P: AsRef<Path>>(app_dir: P, app_id: &str) -> Result<Self> {
        let app_dir = app_dir.as_ref();
        fs::create_dir_all(app_dir)?;

        let path = app_dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!("Acquired run lock {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(Error::Locked(app_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AppLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempdir().unwrap();
        let app_dir = dir.path().join("in.swiggy.android");

        let first = AppLock::acquire(&app_dir, "in.swiggy.android").unwrap();
        assert!(first.path().exists());

        let second = AppLock::acquire(&app_dir, "in.swiggy.android");
        assert!(matches!(second, Err(Error::Locked(ref id)) if id == "in.swiggy.android"));

        drop(first);
        assert!(AppLock::acquire(&app_dir, "in.swiggy.android").is_ok());
    }

    #[test]
    fn test_locks_are_per_app() {
        let dir = tempdir().unwrap();
        let _a = AppLock::acquire(dir.path().join("a"), "a").unwrap();
        assert!(AppLock::acquire(dir.path().join("b"), "b").is_ok());
    }
}
