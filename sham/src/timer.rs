//! Retransmission deadlines and bounded retry policy.
//!
//! Reliable delivery requires that unacknowledged segments are re-sent if no
//! ACK arrives within a bounded time.  This module provides:
//! - [`RetryPolicy`]: the fixed retransmission timeout (RTO) and the
//!   maximum number of retransmissions allowed per segment.
//! - [`next_wakeup`]: the deadline the sender's event loop should sleep
//!   until: the earlier of "next retransmission due" and "poll interval".
//!
//! The RTO is constant.  There is no RTT estimation and no back-off.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::Config;

/// Fixed retransmission timing for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time after which an unacknowledged segment is resent unchanged.
    pub rto: Duration,
    /// Retransmissions allowed per segment before giving up.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(rto: Duration, max_retries: u32) -> Self {
        Self { rto, max_retries }
    }

    /// `true` when a segment sent at `sent_at` has waited at least one RTO.
    pub fn is_expired(&self, sent_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(sent_at) >= self.rto
    }

    /// When a segment sent at `sent_at` becomes due for retransmission.
    pub fn deadline(&self, sent_at: Instant) -> Instant {
        sent_at + self.rto
    }

    /// `true` when a segment already resent `retries` times may not be resent again.
    pub fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self::new(config.rto, config.max_retries)
    }
}

/// The instant the sender loop should wake up at.
///
/// Never later than `now + poll`; earlier when a retransmission falls due
/// first.  A deadline already in the past yields `now`.
pub fn next_wakeup(now: Instant, poll: Duration, retransmit_due: Option<Instant>) -> Instant {
    let poll_deadline = now + poll;
    match retransmit_due {
        Some(due) if due < poll_deadline => due.max(now),
        _ => poll_deadline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_of_rto() {
        let p = RetryPolicy::new(Duration::from_millis(500), 10);
        let t0 = Instant::now();
        assert!(!p.is_expired(t0, t0 + Duration::from_millis(499)));
        assert!(p.is_expired(t0, t0 + Duration::from_millis(500)));
    }

    #[test]
    fn clock_before_send_is_not_expired() {
        let p = RetryPolicy::new(Duration::from_millis(10), 1);
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(1);
        assert!(!p.is_expired(later, t0));
    }

    #[test]
    fn exhaustion_at_max_retries() {
        let p = RetryPolicy::new(Duration::from_millis(500), 3);
        assert!(!p.is_exhausted(2));
        assert!(p.is_exhausted(3));
    }

    #[test]
    fn wakeup_prefers_earlier_retransmit() {
        let now = Instant::now();
        let poll = Duration::from_millis(100);
        let due = now + Duration::from_millis(30);
        assert_eq!(next_wakeup(now, poll, Some(due)), due);
    }

    #[test]
    fn wakeup_capped_by_poll_interval() {
        let now = Instant::now();
        let poll = Duration::from_millis(100);
        let due = now + Duration::from_secs(5);
        assert_eq!(next_wakeup(now, poll, Some(due)), now + poll);
        assert_eq!(next_wakeup(now, poll, None), now + poll);
    }

    #[test]
    fn overdue_retransmit_wakes_immediately() {
        let now = Instant::now() + Duration::from_secs(1);
        let due = now - Duration::from_millis(5);
        assert_eq!(next_wakeup(now, Duration::from_millis(100), Some(due)), now);
    }

    #[test]
    fn policy_from_config() {
        let c = Config::default();
        let p = RetryPolicy::from(&c);
        assert_eq!(p.rto, c.rto);
        assert_eq!(p.max_retries, c.max_retries);
    }
}
