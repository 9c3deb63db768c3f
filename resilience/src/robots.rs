use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scraper_common::ssrf::PublicIpResolver;
use tokio::sync::Mutex;

/// One `Disallow`/`Allow` rule under a `User-agent` group.
#[derive(Debug, Clone)]
struct Rule {
    path: String,
    allow: bool,
}

/// Parsed robots.txt rules, grouped by the `User-agent` they apply to.
/// `*` is the catch-all group consulted when no group matches the caller's
/// user agent exactly.
#[derive(Debug, Clone, Default)]
struct RobotsRules {
    groups: HashMap<String, Vec<Rule>>,
}

impl RobotsRules {
    /// Permissive sentinel used when the fetch failed: no groups, so every
    /// lookup falls through to "allow".
    fn allow_all() -> Self {
        Self::default()
    }

    fn parse(body: &str) -> Self {
        let mut groups: HashMap<String, Vec<Rule>> = HashMap::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut agents_open = true;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !agents_open {
                        current_agents.clear();
                        agents_open = true;
                    }
                    current_agents.push(value.to_ascii_lowercase());
                }
                "disallow" if !value.is_empty() => {
                    agents_open = false;
                    for agent in &current_agents {
                        groups.entry(agent.clone()).or_default().push(Rule {
                            path: value.to_string(),
                            allow: false,
                        });
                    }
                }
                "disallow" => {
                    // Empty Disallow means "allow everything" for this group.
                    agents_open = false;
                }
                "allow" => {
                    agents_open = false;
                    for agent in &current_agents {
                        groups.entry(agent.clone()).or_default().push(Rule {
                            path: value.to_string(),
                            allow: true,
                        });
                    }
                }
                _ => {}
            }
        }

        Self { groups }
    }

    /// Longest-matching-rule wins, as `robots.txt` convention dictates; a
    /// missing match at all is an allow.
    fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let agent_key = user_agent.to_ascii_lowercase();
        let rules = self
            .groups
            .get(&agent_key)
            .or_else(|| self.groups.get("*"));

        let Some(rules) = rules else {
            return true;
        };

        let mut best: Option<&Rule> = None;
        for rule in rules {
            if path.starts_with(&rule.path)
                && best.map_or(true, |b| rule.path.len() > b.path.len())
            {
                best = Some(rule);
            }
        }

        best.map(|r| r.allow).unwrap_or(true)
    }
}

struct CacheEntry {
    content: Option<String>,
    rules: RobotsRules,
    fetched_at: Instant,
}

/// Fetches, caches, and evaluates robots.txt for target domains. Biased
/// permissive: any fetch failure (non-2xx, timeout, transport error) caches
/// an "allow all" sentinel rather than blocking the scrape.
pub struct RobotsChecker {
    client: reqwest::Client,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl RobotsChecker {
    pub fn new(cache_ttl_seconds: i64, fetch_timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .dns_resolver(Arc::new(PublicIpResolver))
            .timeout(Duration::from_secs(fetch_timeout_seconds))
            .build()
            .expect("robots.txt client config is static and valid");

        Self {
            client,
            cache_ttl: Duration::from_secs(cache_ttl_seconds.max(0) as u64),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached content when fresh; otherwise fetches, caching the
    /// body on 2xx and an "allow all" sentinel on anything else.
    pub async fn fetch_robots_txt(&self, domain: &str) -> Option<String> {
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(domain) {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return entry.content.clone();
                }
            }
        }

        let url = format!("https://{domain}/robots.txt");
        let (content, rules) = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => {
                    let rules = RobotsRules::parse(&body);
                    (Some(body), rules)
                }
                Err(err) => {
                    tracing::warn!(domain, error = %err, "failed to read robots.txt body, assuming all allowed");
                    (None, RobotsRules::allow_all())
                }
            },
            Ok(response) => {
                tracing::info!(
                    domain,
                    status = response.status().as_u16(),
                    "robots.txt fetch returned non-2xx, assuming all allowed"
                );
                (None, RobotsRules::allow_all())
            }
            Err(err) => {
                tracing::warn!(domain, error = %err, "failed to fetch robots.txt, assuming all allowed");
                (None, RobotsRules::allow_all())
            }
        };

        let mut cache = self.cache.lock().await;
        cache.insert(
            domain.to_string(),
            CacheEntry {
                content: content.clone(),
                rules,
                fetched_at: Instant::now(),
            },
        );
        content
    }

    /// `true` when no cache entry exists yet (fetch not performed) — the
    /// permissive default extends to the "haven't checked" case too.
    pub async fn is_url_allowed(&self, domain: &str, path: &str, user_agent: &str) -> bool {
        let cache = self.cache.lock().await;
        match cache.get(domain) {
            Some(entry) => entry.rules.is_allowed(user_agent, path),
            None => true,
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_match_wins() {
        let rules = RobotsRules::parse(
            "User-agent: *\nDisallow: /private\nAllow: /private/public\n",
        );
        assert!(!rules.is_allowed("*", "/private/secret"));
        assert!(rules.is_allowed("*", "/private/public/page"));
    }

    #[test]
    fn no_rules_means_allowed() {
        let rules = RobotsRules::allow_all();
        assert!(rules.is_allowed("*", "/anything"));
    }

    #[tokio::test]
    async fn unknown_domain_is_allowed_without_fetch() {
        let checker = RobotsChecker::new(3600, 10);
        assert!(checker.is_url_allowed("never-fetched.example", "/x", "*").await);
    }
}
