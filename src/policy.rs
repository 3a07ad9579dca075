use crate::config::{RetryConfig, RetryLimit};
use std::time::Duration;

/// Retry bookkeeping for a single connection.
///
/// Owned exclusively by the connection actor; the policy below only ever
/// reads or mutates the state it is handed, so the backoff math is
/// testable without a live transport or a clock.
#[derive(Debug, Clone)]
pub(crate) struct ReconnectState {
    /// Attempts consumed so far, or the terminal halt sentinel.
    pub attempts: Attempts,
    /// Delay the next timer would grow from. Starts at the configured
    /// base timeout and only ever grows.
    pub current_delay: Duration,
}

/// Attempt counter with a terminal sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempts {
    /// Reconnection is permanently off. Set by `close(permanent)`, by a
    /// `RetryLimit::Disabled` config, or once a halt decision is taken.
    Halted,
    /// Number of retries consumed since construction.
    Used(u32),
}

impl ReconnectState {
    pub fn new(retry: &RetryConfig) -> Self {
        let attempts = match retry.limit {
            RetryLimit::Disabled => Attempts::Halted,
            RetryLimit::Limit(_) => Attempts::Used(0),
        };
        Self {
            attempts,
            current_delay: retry.timeout,
        }
    }

    /// Mark the state so no reconnection is ever attempted again.
    pub fn halt(&mut self) {
        self.attempts = Attempts::Halted;
    }
}

/// Outcome of a reconnect decision after a transport loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Reconnection is disabled; detach and close permanently.
    Halt,
    /// The retry budget is spent; stay torn down and report it.
    Exhausted {
        /// Retries consumed (the initial connect is not counted here).
        retries: u32,
    },
    /// Arm a timer and reconnect when it fires.
    RetryAfter { delay: Duration, attempt: u32 },
}

/// Pure retry/backoff calculator.
///
/// No I/O and no wall-clock reads: given the same [`ReconnectState`] it
/// always produces the same answer. The caller owns timer scheduling.
#[derive(Debug, Clone)]
pub(crate) struct ReconnectPolicy {
    limit: RetryLimit,
    multiplier: f64,
}

impl ReconnectPolicy {
    pub fn new(retry: &RetryConfig) -> Self {
        Self {
            limit: retry.limit,
            multiplier: retry.multiplier,
        }
    }

    /// Whether one more reconnect attempt fits the budget.
    pub fn should_retry(&self, state: &ReconnectState) -> bool {
        match (state.attempts, self.limit) {
            (Attempts::Halted, _) => false,
            (_, RetryLimit::Disabled) => false,
            (Attempts::Used(used), RetryLimit::Limit(max)) => used < max,
        }
    }

    /// The delay the next timer should be armed with.
    ///
    /// `current * (1 + multiplier)`: growth is monotonic even for
    /// fractional multipliers, and a multiplier of 0 freezes the delay at
    /// its base value instead of collapsing it to zero. Growth saturates
    /// at `Duration::MAX` once the product stops being representable, so
    /// large multipliers and long retry budgets stay panic-free.
    pub fn next_delay(&self, state: &ReconnectState) -> Duration {
        let secs = state.current_delay.as_secs_f64() * (1.0 + self.multiplier);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Take the reconnect decision for a lost transport, consuming one
    /// attempt and growing the delay when a retry is granted.
    pub fn decide(&self, state: &mut ReconnectState) -> RetryDecision {
        match state.attempts {
            Attempts::Halted => RetryDecision::Halt,
            Attempts::Used(used) => {
                if !self.should_retry(state) {
                    RetryDecision::Exhausted { retries: used }
                } else {
                    let attempt = used + 1;
                    state.attempts = Attempts::Used(attempt);
                    state.current_delay = self.next_delay(state);
                    RetryDecision::RetryAfter {
                        delay: state.current_delay,
                        attempt,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry(limit: RetryLimit, timeout_ms: u64, multiplier: f64) -> RetryConfig {
        RetryConfig {
            limit,
            timeout: Duration::from_millis(timeout_ms),
            multiplier,
        }
    }

    #[test]
    fn test_delay_growth_sequence() {
        let config = retry(RetryLimit::Limit(10), 2000, 2.0);
        let policy = ReconnectPolicy::new(&config);
        let mut state = ReconnectState::new(&config);

        // 2000 -> 6000 -> 18000 -> 54000, each previous * (1 + multiplier)
        assert_eq!(state.current_delay, Duration::from_millis(2000));
        for expected in [6000u64, 18000, 54000] {
            match policy.decide(&mut state) {
                RetryDecision::RetryAfter { delay, .. } => {
                    assert_eq!(delay, Duration::from_millis(expected));
                }
                other => panic!("expected retry, got {:?}", other),
            }
            assert_eq!(state.current_delay, Duration::from_millis(expected));
        }
    }

    #[test]
    fn test_zero_multiplier_freezes_delay() {
        let config = retry(RetryLimit::Limit(5), 500, 0.0);
        let policy = ReconnectPolicy::new(&config);
        let mut state = ReconnectState::new(&config);

        for _ in 0..3 {
            match policy.decide(&mut state) {
                RetryDecision::RetryAfter { delay, .. } => {
                    assert_eq!(delay, Duration::from_millis(500));
                }
                other => panic!("expected retry, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_delay_growth_saturates_at_duration_max() {
        let config = retry(RetryLimit::Limit(100), 2000, 2.0);
        let policy = ReconnectPolicy::new(&config);
        let mut state = ReconnectState::new(&config);

        // Tripling from 2000ms leaves the representable range after a
        // few dozen attempts; growth must clamp, not panic.
        for _ in 0..60 {
            match policy.decide(&mut state) {
                RetryDecision::RetryAfter { .. } => {}
                other => panic!("expected retry, got {:?}", other),
            }
        }
        assert_eq!(state.current_delay, Duration::MAX);
    }

    #[test]
    fn test_huge_multiplier_clamps_on_first_retry() {
        let config = retry(RetryLimit::Limit(3), 2000, 1e18);
        let policy = ReconnectPolicy::new(&config);
        let mut state = ReconnectState::new(&config);

        match policy.decide(&mut state) {
            RetryDecision::RetryAfter { delay, .. } => assert_eq!(delay, Duration::MAX),
            other => panic!("expected retry, got {:?}", other),
        }
        // Further growth from the clamp stays at the clamp.
        match policy.decide(&mut state) {
            RetryDecision::RetryAfter { delay, .. } => assert_eq!(delay, Duration::MAX),
            other => panic!("expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_next_delay_is_deterministic_and_side_effect_free() {
        let config = retry(RetryLimit::Limit(3), 2000, 2.0);
        let policy = ReconnectPolicy::new(&config);
        let state = ReconnectState::new(&config);

        assert_eq!(policy.next_delay(&state), Duration::from_millis(6000));
        assert_eq!(policy.next_delay(&state), Duration::from_millis(6000));
        assert_eq!(state.current_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_budget_exhaustion_after_limit() {
        let config = retry(RetryLimit::Limit(3), 100, 1.0);
        let policy = ReconnectPolicy::new(&config);
        let mut state = ReconnectState::new(&config);

        for attempt in 1..=3u32 {
            match policy.decide(&mut state) {
                RetryDecision::RetryAfter { attempt: a, .. } => assert_eq!(a, attempt),
                other => panic!("expected retry, got {:?}", other),
            }
        }
        assert_eq!(
            policy.decide(&mut state),
            RetryDecision::Exhausted { retries: 3 }
        );
        // Repeated losses keep reporting exhaustion, never retry.
        assert_eq!(
            policy.decide(&mut state),
            RetryDecision::Exhausted { retries: 3 }
        );
    }

    #[test]
    fn test_zero_limit_exhausts_immediately() {
        let config = retry(RetryLimit::Limit(0), 100, 1.0);
        let policy = ReconnectPolicy::new(&config);
        let mut state = ReconnectState::new(&config);

        assert!(!policy.should_retry(&state));
        assert_eq!(
            policy.decide(&mut state),
            RetryDecision::Exhausted { retries: 0 }
        );
    }

    #[test]
    fn test_disabled_limit_halts_without_exhaustion() {
        let config = retry(RetryLimit::Disabled, 100, 1.0);
        let policy = ReconnectPolicy::new(&config);
        let mut state = ReconnectState::new(&config);

        assert_eq!(state.attempts, Attempts::Halted);
        assert!(!policy.should_retry(&state));
        assert_eq!(policy.decide(&mut state), RetryDecision::Halt);
    }

    #[test]
    fn test_halted_state_never_retries() {
        let config = retry(RetryLimit::Limit(3), 100, 1.0);
        let policy = ReconnectPolicy::new(&config);
        let mut state = ReconnectState::new(&config);

        state.halt();
        assert!(!policy.should_retry(&state));
        assert_eq!(policy.decide(&mut state), RetryDecision::Halt);
    }
}
