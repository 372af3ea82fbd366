//! Reconnection backoff

use std::time::Duration;

/// Delay used when the configured table is empty
const FALLBACK_DELAY: Duration = Duration::from_secs(16);

/// Bounded exponential backoff driven by a delay table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Policy with a delay table and an attempt budget
    pub fn new(delays: Vec<Duration>, max_attempts: u32) -> Self {
        Self {
            delays,
            max_attempts,
        }
    }

    /// Delay before attempt `attempt` (1-indexed); past the table the last
    /// entry is reused
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.delays
            .get(index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(FALLBACK_DELAY)
    }

    /// Attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            [1, 2, 4, 8, 16].into_iter().map(Duration::from_secs).collect(),
            5,
        )
    }
}

/// Attempt counter for one run of reconnects
#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectState {
    /// Fresh counter
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Claim the next attempt, returning its number and delay, or `None`
    /// once the budget is spent
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.policy.delay_for(self.attempts)))
    }

    /// Attempts claimed so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Forget previous attempts
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        let delays: Vec<u64> = std::iter::from_fn(|| state.next_delay())
            .map(|(_, delay)| delay.as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert_eq!(state.attempts(), 5);
        assert!(state.next_delay().is_none());
    }

    #[test]
    fn test_reuses_last_delay_past_table() {
        let policy = ReconnectPolicy::new(vec![Duration::from_millis(100)], 3);
        assert_eq!(policy.delay_for(3), Duration::from_millis(100));
    }

    #[test]
    fn test_empty_table_falls_back() {
        let policy = ReconnectPolicy::new(Vec::new(), 1);
        assert_eq!(policy.delay_for(1), FALLBACK_DELAY);
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut state = ReconnectState::new(ReconnectPolicy::new(vec![Duration::from_secs(1)], 1));
        assert_eq!(state.next_delay(), Some((1, Duration::from_secs(1))));
        assert!(state.next_delay().is_none());
        state.reset();
        assert_eq!(state.next_delay(), Some((1, Duration::from_secs(1))));
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let mut state = ReconnectState::new(ReconnectPolicy::new(vec![Duration::from_secs(1)], 0));
        assert!(state.next_delay().is_none());
    }
}
