//! Chrome profile directory management: each launch gets a fresh,
//! UUID-named user-data directory so concurrent instances never collide on
//! `SingletonLock`, and the directory is removed again on drop.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::BrowserError;

/// RAII wrapper for a Chrome user-data directory. Removes the directory on
/// drop unless [`BrowserProfile::into_path`] has transferred ownership
/// elsewhere (e.g. to the pool's own crash-recovery bookkeeping).
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleanup_on_drop: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            if let Err(err) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to clean up browser profile directory");
            }
        }
    }
}

/// Creates a unique profile directory under the system temp dir. Uses
/// `create_dir` rather than `create_dir_all` so a UUID collision fails loudly
/// instead of silently reusing an existing profile.
pub fn create_unique_profile() -> Result<BrowserProfile, BrowserError> {
    let path = std::env::temp_dir().join(format!("scraper_chrome_{}", Uuid::new_v4()));
    std::fs::create_dir(&path).map_err(BrowserError::ProfileCreation)?;
    tracing::debug!(path = %path.display(), "created browser profile directory");
    Ok(BrowserProfile::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_unique_directories() {
        let a = create_unique_profile().expect("profile a");
        let b = create_unique_profile().expect("profile b");
        assert_ne!(a.path(), b.path());
        assert!(a.path().exists());
        assert!(b.path().exists());
    }

    #[test]
    fn drop_removes_directory() {
        let path = {
            let profile = create_unique_profile().expect("profile");
            profile.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn into_path_disables_cleanup() {
        let profile = create_unique_profile().expect("profile");
        let path = profile.into_path();
        assert!(path.exists());
        std::fs::remove_dir_all(&path).expect("manual cleanup");
    }
}
