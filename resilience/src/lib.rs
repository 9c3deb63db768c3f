//! Per-domain resilience primitives: the token-bucket rate limiter, the
//! sliding-window circuit breaker, and the permissively-biased robots.txt
//! checker. Each is keyed by domain and isolated from the others — no
//! cross-domain lock contention.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod robots;

pub use circuit_breaker::{CircuitState, DomainCircuitBreaker};
pub use rate_limiter::DomainRateLimiter;
pub use robots::RobotsChecker;
