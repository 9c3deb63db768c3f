use std::collections::HashMap;
use std::fs;

use serde::Deserialize;

/// Optional allowed-hours window, in UTC, both ends inclusive. `start > end`
/// is a valid wrapping window (e.g. 22..6 means "overnight").
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AllowedHours {
    pub start: u8,
    pub end: u8,
}

impl AllowedHours {
    pub fn contains(&self, hour: u8) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour <= self.end
        } else {
            hour >= self.start || hour <= self.end
        }
    }
}

/// Immutable per-domain configuration record.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainPolicy {
    pub tokens_per_interval: f64,
    pub interval_seconds: f64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub allowed_hours: Option<AllowedHours>,
    #[serde(default)]
    pub respect_robots_txt: bool,
}

impl DomainPolicy {
    pub fn default_policy() -> Self {
        Self {
            tokens_per_interval: 2.0,
            interval_seconds: 10.0,
            min_delay_ms: 500,
            max_delay_ms: 2000,
            allowed_hours: None,
            respect_robots_txt: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPolicyFile {
    #[serde(default)]
    domains: HashMap<String, serde_yaml::Value>,
}

/// Loads the YAML domain-policy file. Invalid per-domain entries are skipped
/// individually rather than failing the whole load; a missing/unreadable
/// file, a parse error, or one with no `domains` key, falls back to a single
/// `default` entry built from the built-in constants. A `default` entry is
/// always synthesized if the file does not define one.
pub fn load_domain_policies(path: Option<&str>) -> HashMap<String, DomainPolicy> {
    let mut policies = HashMap::new();

    let raw = path
        .and_then(|path| fs::read_to_string(path).ok())
        .and_then(|contents| serde_yaml::from_str::<RawPolicyFile>(&contents).ok());

    if let Some(raw) = raw {
        for (domain, value) in raw.domains {
            match serde_yaml::from_value::<DomainPolicy>(value) {
                Ok(policy) => {
                    policies.insert(domain, policy);
                }
                Err(err) => {
                    tracing::warn!(domain = %domain, error = %err, "skipping invalid domain policy entry");
                }
            }
        }
    }

    policies
        .entry("default".to_string())
        .or_insert_with(DomainPolicy::default_policy);

    policies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_default_only() {
        let policies = load_domain_policies(Some("/nonexistent/path.yaml"));
        assert_eq!(policies.len(), 1);
        assert!(policies.contains_key("default"));
    }

    #[test]
    fn allowed_hours_wraps_overnight() {
        let hours = AllowedHours { start: 22, end: 6 };
        assert!(hours.contains(23));
        assert!(hours.contains(2));
        assert!(!hours.contains(12));
    }

    #[test]
    fn allowed_hours_normal_range() {
        let hours = AllowedHours { start: 9, end: 17 };
        assert!(hours.contains(12));
        assert!(!hours.contains(20));
    }
}
