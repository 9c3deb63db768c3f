//! Headless Chromium lifecycle management: executable discovery, profile
//! directory hygiene, a recycling browser pool, and per-session fingerprint
//! randomization.

pub mod discovery;
pub mod fingerprint;
pub mod pool;
pub mod profile;

pub use fingerprint::{FingerprintProfile, FingerprintRandomizer};
pub use pool::{BrowserPool, BrowserPoolStats};
pub use profile::BrowserProfile;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no browser executable found and no managed download configured")]
    ExecutableNotFound,
    #[error("failed to create browser profile directory: {0}")]
    ProfileCreation(#[source] std::io::Error),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser pool exhausted")]
    PoolExhausted,
    #[error("browser instance unavailable: {0}")]
    InstanceUnavailable(String),
    #[error("CDP command failed: {0}")]
    Cdp(String),
}
