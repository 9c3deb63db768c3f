use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Three-state machine for a single domain's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct DomainState {
    state: CircuitState,
    recent_calls: VecDeque<(Instant, bool)>,
    last_state_change: Instant,
}

impl DomainState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            recent_calls: VecDeque::new(),
            last_state_change: Instant::now(),
        }
    }
}

/// Per-domain sliding-window circuit breaker. An unknown domain is
/// conceptually closed with an empty ring; its state is only materialized on
/// first access.
pub struct DomainCircuitBreaker {
    window_size: usize,
    failure_threshold: usize,
    cooldown: Duration,
    states: Mutex<HashMap<String, DomainState>>,
}

impl DomainCircuitBreaker {
    pub fn new(window_size: usize, failure_threshold: usize, cooldown_seconds: i64) -> Self {
        Self {
            window_size,
            failure_threshold,
            cooldown: Duration::from_secs(cooldown_seconds.max(0) as u64),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// `true` for unknown or closed domains; for open, `true` only once the
    /// cooldown has elapsed, atomically transitioning to half-open in that
    /// case; for half-open, always `true` (the probe call).
    pub async fn can_call(&self, domain: &str) -> bool {
        let mut states = self.states.lock().await;
        let Some(state) = states.get_mut(domain) else {
            return true;
        };

        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if state.last_state_change.elapsed() >= self.cooldown {
                    state.state = CircuitState::HalfOpen;
                    state.last_state_change = Instant::now();
                    tracing::info!(domain, "circuit half-open, allowing probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Half-open success closes the circuit and clears the ring; closed
    /// success is just appended to the ring.
    pub async fn record_success(&self, domain: &str) {
        let mut states = self.states.lock().await;
        let state = states
            .entry(domain.to_string())
            .or_insert_with(DomainState::new);

        if state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Closed;
            state.last_state_change = Instant::now();
            state.recent_calls.clear();
            tracing::info!(domain, "circuit closed after successful probe");
            return;
        }

        Self::append(state, self.window_size, true);
    }

    /// Half-open failure reopens and resets the cooldown clock; closed
    /// failure is appended and may trip the breaker open.
    pub async fn record_failure(&self, domain: &str) {
        let mut states = self.states.lock().await;
        let state = states
            .entry(domain.to_string())
            .or_insert_with(DomainState::new);

        if state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Open;
            state.last_state_change = Instant::now();
            state.recent_calls.clear();
            tracing::warn!(domain, "circuit reopened after failed probe");
            return;
        }

        Self::append(state, self.window_size, false);

        if state.state == CircuitState::Closed {
            let failures = state.recent_calls.iter().filter(|(_, ok)| !ok).count();
            if failures >= self.failure_threshold {
                state.state = CircuitState::Open;
                state.last_state_change = Instant::now();
                tracing::warn!(domain, failures, "circuit opened");
            }
        }
    }

    fn append(state: &mut DomainState, window_size: usize, success: bool) {
        state.recent_calls.push_back((Instant::now(), success));
        while state.recent_calls.len() > window_size {
            state.recent_calls.pop_front();
        }
    }

    /// Returns [`CircuitState::Closed`] for domains with no recorded state.
    pub async fn get_state(&self, domain: &str) -> CircuitState {
        self.states
            .lock()
            .await
            .get(domain)
            .map(|s| s.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub async fn get_all_states(&self) -> HashMap<String, CircuitState> {
        self.states
            .lock()
            .await
            .iter()
            .map(|(domain, state)| (domain.clone(), state.state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let cb = DomainCircuitBreaker::new(5, 3, 120);
        for _ in 0..3 {
            cb.record_failure("bad.com").await;
        }
        assert_eq!(cb.get_state("bad.com").await, CircuitState::Open);
        assert!(!cb.can_call("bad.com").await);
    }

    #[tokio::test]
    async fn evicts_old_failures_outside_window() {
        let cb = DomainCircuitBreaker::new(5, 3, 120);
        cb.record_failure("a.com").await;
        cb.record_failure("a.com").await;
        for _ in 0..5 {
            cb.record_success("a.com").await;
        }
        assert_eq!(cb.get_state("a.com").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn probes_after_cooldown_then_closes_on_success() {
        let cb = DomainCircuitBreaker::new(5, 1, 0);
        cb.record_failure("flaky.com").await;
        assert_eq!(cb.get_state("flaky.com").await, CircuitState::Open);

        assert!(cb.can_call("flaky.com").await);
        assert_eq!(cb.get_state("flaky.com").await, CircuitState::HalfOpen);

        cb.record_success("flaky.com").await;
        assert_eq!(cb.get_state("flaky.com").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = DomainCircuitBreaker::new(5, 1, 0);
        cb.record_failure("flaky.com").await;
        cb.can_call("flaky.com").await;
        cb.record_failure("flaky.com").await;
        assert_eq!(cb.get_state("flaky.com").await, CircuitState::Open);
    }

    #[tokio::test]
    async fn unknown_domain_is_closed() {
        let cb = DomainCircuitBreaker::new(5, 3, 120);
        assert_eq!(cb.get_state("never-seen.com").await, CircuitState::Closed);
        assert!(cb.can_call("never-seen.com").await);
    }
}
