//! Upstream proxy rotation: round-robin selection with per-domain cooldown,
//! health marking, and a background probe loop that restores unhealthy
//! proxies.

pub mod manager;

pub use manager::{ProxyEndpoint, ProxyManager, ProxyManagerStats};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no healthy proxies available")]
    NoHealthyProxies,
}
