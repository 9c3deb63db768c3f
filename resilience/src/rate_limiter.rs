use std::collections::HashMap;
use std::time::{Duration, Instant};

use scraper_common::domain_policy::load_domain_policies;
use tokio::sync::Mutex;

/// Token bucket state for a single domain.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
    reduced_until: Option<Instant>,
    original_refill_rate: f64,
}

#[derive(Debug, Clone, Copy)]
struct PolicyOverride {
    tokens_per_interval: f64,
    interval_seconds: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterStats {
    pub current_tokens: f64,
    pub max_tokens: f64,
    pub refill_rate: f64,
    pub is_reduced: bool,
}

struct Inner {
    buckets: HashMap<String, TokenBucket>,
    policies: HashMap<String, PolicyOverride>,
}

/// Per-domain token-bucket rate limiter with adaptive backoff, isolated per
/// domain behind a single lock guarding a non-suspending critical section.
pub struct DomainRateLimiter {
    default_tokens: f64,
    default_interval: f64,
    inner: Mutex<Inner>,
}

impl DomainRateLimiter {
    pub fn new(default_tokens: f64, default_interval: f64) -> Self {
        Self {
            default_tokens,
            default_interval,
            inner: Mutex::new(Inner {
                buckets: HashMap::new(),
                policies: HashMap::new(),
            }),
        }
    }

    fn new_bucket(&self, tokens: f64, interval: f64) -> TokenBucket {
        let refill_rate = if interval > 0.0 {
            tokens / interval
        } else {
            tokens
        };
        TokenBucket {
            tokens,
            max_tokens: tokens,
            refill_rate,
            last_refill: Instant::now(),
            reduced_until: None,
            original_refill_rate: refill_rate,
        }
    }

    fn get_or_create<'a>(&self, inner: &'a mut Inner, domain: &str) -> &'a mut TokenBucket {
        if !inner.buckets.contains_key(domain) {
            let (tokens, interval) = match inner.policies.get(domain) {
                Some(p) => (p.tokens_per_interval, p.interval_seconds),
                None => (self.default_tokens, self.default_interval),
            };
            let bucket = self.new_bucket(tokens, interval);
            inner.buckets.insert(domain.to_string(), bucket);
        }
        inner.buckets.get_mut(domain).expect("just inserted")
    }

    fn refill(bucket: &mut TokenBucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();

        if elapsed <= 0.0 {
            return;
        }

        if let Some(reduced_until) = bucket.reduced_until {
            if now >= reduced_until {
                bucket.refill_rate = bucket.original_refill_rate;
                bucket.reduced_until = None;
                tracing::info!(refill_rate = bucket.refill_rate, "rate restored");
            }
        }

        bucket.tokens = (bucket.tokens + elapsed * bucket.refill_rate).min(bucket.max_tokens);
        bucket.last_refill = now;
    }

    /// Blocks until a token is available for `domain`. The lock is held only
    /// for the refill-and-check step; the sleep between retries happens
    /// outside it so unrelated domains never wait on each other.
    pub async fn acquire(&self, domain: &str) {
        loop {
            let wait_time = {
                let mut inner = self.inner.lock().await;
                let bucket = self.get_or_create(&mut inner, domain);
                Self::refill(bucket);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }

                if bucket.refill_rate > 0.0 {
                    (1.0 - bucket.tokens) / bucket.refill_rate
                } else {
                    1.0
                }
            };

            tokio::time::sleep(Duration::from_secs_f64(wait_time.max(0.0))).await;
        }
    }

    /// Adaptive backoff: always rebases off `original_refill_rate`, so
    /// repeated calls with the same factor never compound.
    pub async fn reduce_rate(&self, domain: &str, factor: f64, duration: Duration) {
        let mut inner = self.inner.lock().await;
        let bucket = self.get_or_create(&mut inner, domain);
        bucket.refill_rate = bucket.original_refill_rate * factor;
        bucket.reduced_until = Some(Instant::now() + duration);
        tracing::warn!(
            domain,
            from = bucket.original_refill_rate,
            to = bucket.refill_rate,
            duration_secs = duration.as_secs(),
            "rate reduced"
        );
    }

    pub async fn get_stats(&self, domain: &str) -> RateLimiterStats {
        let mut inner = self.inner.lock().await;
        if !inner.buckets.contains_key(domain) {
            return RateLimiterStats {
                current_tokens: self.default_tokens,
                max_tokens: self.default_tokens,
                refill_rate: if self.default_interval > 0.0 {
                    self.default_tokens / self.default_interval
                } else {
                    self.default_tokens
                },
                is_reduced: false,
            };
        }

        let bucket = inner.buckets.get_mut(domain).expect("checked above");
        Self::refill(bucket);
        RateLimiterStats {
            current_tokens: bucket.tokens,
            max_tokens: bucket.max_tokens,
            refill_rate: bucket.refill_rate,
            is_reduced: bucket.reduced_until.is_some(),
        }
    }

    /// Loads per-domain overrides from the domain-policy YAML file. Existing
    /// buckets for domains that now have a policy are dropped so they pick
    /// up the new configuration from scratch on next access.
    pub async fn load_policies(&self, yaml_path: Option<&str>) {
        let policies = load_domain_policies(yaml_path);
        let mut inner = self.inner.lock().await;

        inner.policies = policies
            .iter()
            .map(|(domain, policy)| {
                (
                    domain.clone(),
                    PolicyOverride {
                        tokens_per_interval: policy.tokens_per_interval,
                        interval_seconds: policy.interval_seconds,
                    },
                )
            })
            .collect();

        let overridden: Vec<String> = inner.policies.keys().cloned().collect();
        for domain in overridden {
            inner.buckets.remove(&domain);
        }

        tracing::info!(domain_count = inner.policies.len(), "loaded rate limit policies");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_never_exceed_max() {
        let limiter = DomainRateLimiter::new(2.0, 10.0);
        limiter.acquire("a.com").await;
        let stats = limiter.get_stats("a.com").await;
        assert!(stats.current_tokens <= stats.max_tokens);
    }

    #[tokio::test]
    async fn distinct_domains_are_independent() {
        let limiter = DomainRateLimiter::new(1.0, 10.0);
        limiter.acquire("a.com").await;
        // a.com is now out of tokens; b.com must still have its own bucket.
        let stats = limiter.get_stats("b.com").await;
        assert_eq!(stats.current_tokens, 1.0);
    }

    #[tokio::test]
    async fn reduce_rate_never_compounds() {
        let limiter = DomainRateLimiter::new(2.0, 10.0);
        limiter
            .reduce_rate("a.com", 0.5, Duration::from_secs(300))
            .await;
        limiter
            .reduce_rate("a.com", 0.5, Duration::from_secs(300))
            .await;
        let stats = limiter.get_stats("a.com").await;
        assert_eq!(stats.refill_rate, 0.2 / 2.0);
    }
}
