use std::error::Error as StdError;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use futures::FutureExt;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tokio::task::spawn_blocking;
use url::Url;

/// Returns `true` if `addr` falls in a range this service must never reach:
/// RFC 1918 private ranges, loopback (127/8), link-local (169.254/16),
/// `0.0.0.0/8`, broadcast, multicast, or unspecified.
fn is_blocked(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => {
            ip.octets()[0] == 0 // "this network", covers 0.0.0.0/8
                || ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_broadcast()
                || ip.is_multicast()
                || ip.is_unspecified()
                || ip.is_documentation()
        }
        IpAddr::V6(ip) => ip.is_loopback() || ip.is_multicast() || ip.is_unspecified(),
    }
}

fn is_global(addr: &SocketAddr) -> bool {
    !is_blocked(&addr.ip())
}

/// Validates a caller-provided URL before it is ever used to construct a
/// task: rejects non-http(s) schemes and URLs whose hostname resolves to a
/// blocked address. Shares `is_blocked`'s classification with
/// [`PublicIpResolver`] so the pre-flight check and the DNS resolver used by
/// the navigation/outbound HTTP clients cannot disagree about what counts as
/// private.
pub async fn validate_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }

    let Some(host) = parsed.host_str() else {
        return false;
    };

    let port = parsed.port_or_known_default().unwrap_or(80);
    let host = host.to_string();

    let resolved = spawn_blocking(move || (host.as_str(), port).to_socket_addrs())
        .await
        .ok()
        .and_then(|r| r.ok());

    match resolved {
        Some(addrs) => {
            let addrs: Vec<_> = addrs.collect();
            !addrs.is_empty() && addrs.iter().all(is_global)
        }
        None => false,
    }
}

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// `reqwest` DNS resolver that filters results down to globally routable
/// addresses, used by every outbound HTTP client in this service (robots.txt
/// fetch, proxy health checks, webhook delivery, credential backend calls)
/// so SSRF protection is enforced at the transport layer, not only at
/// request-validation time.
#[derive(Debug, Clone, Default)]
pub struct PublicIpResolver;

impl Resolve for PublicIpResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolve_host = move || (name.as_str(), 0).to_socket_addrs();

        let future_result = spawn_blocking(resolve_host).map(|result| match result {
            Ok(Ok(addrs)) => {
                let addrs: Addrs = Box::new(addrs.filter(is_global));
                Ok(addrs)
            }
            Ok(Err(err)) => {
                let err: BoxError = Box::new(err);
                Err(err)
            }
            Err(join_err) => {
                if join_err.is_cancelled() {
                    let err: BoxError =
                        Box::new(io::Error::new(io::ErrorKind::Interrupted, join_err));
                    Err(err)
                } else {
                    panic!("background DNS resolution task failed: {join_err}")
                }
            }
        });

        Box::pin(future_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_private_ranges() {
        assert!(is_blocked(&"10.0.0.5".parse().unwrap()));
        assert!(is_blocked(&"172.16.0.1".parse().unwrap()));
        assert!(is_blocked(&"192.168.1.1".parse().unwrap()));
        assert!(is_blocked(&"127.0.0.1".parse().unwrap()));
        assert!(is_blocked(&"169.254.1.1".parse().unwrap()));
        assert!(is_blocked(&"0.0.0.0".parse().unwrap()));
    }

    #[test]
    fn allows_public_ranges() {
        assert!(!is_blocked(&"8.8.8.8".parse().unwrap()));
        assert!(!is_blocked(&"93.184.216.34".parse().unwrap()));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        assert!(!validate_url("ftp://example.com/file").await);
        assert!(!validate_url("not a url").await);
    }
}
