//! Locates a Chrome/Chromium executable on the host. `CHROMIUM_PATH` always
//! wins; otherwise a platform-specific list of common install locations is
//! probed before falling back to a `PATH` lookup.

use std::path::PathBuf;

use crate::BrowserError;

fn candidate_paths() -> Vec<&'static str> {
    if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
        ]
    }
}

const PATH_EXECUTABLES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

/// Finds a usable browser executable, preferring the explicit override, then
/// well-known install paths, then a `PATH` search.
pub fn find_browser_executable() -> Result<PathBuf, BrowserError> {
    if let Ok(raw) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(&raw);
        if path.exists() {
            tracing::info!(path = %path.display(), "using browser from CHROMIUM_PATH");
            return Ok(path);
        }
        tracing::warn!(path = %raw, "CHROMIUM_PATH does not exist, falling back to discovery");
    }

    for candidate in candidate_paths() {
        let path = PathBuf::from(candidate);
        if path.exists() {
            tracing::info!(path = %path.display(), "found browser executable");
            return Ok(path);
        }
    }

    for name in PATH_EXECUTABLES {
        if let Ok(path) = which::which(name) {
            tracing::info!(path = %path.display(), "found browser executable on PATH");
            return Ok(path);
        }
    }

    Err(BrowserError::ExecutableNotFound)
}
