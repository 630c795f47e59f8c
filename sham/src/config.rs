//! Protocol parameters.
//!
//! Every constant the protocol engine depends on lives in [`Config`].  The
//! [`Default`] impl carries the values both peers must agree on for the
//! standard deployment; tests shrink the timers to keep wall time low.

use std::time::Duration;

use thiserror::Error;

use crate::packet::MAX_PAYLOAD;

/// Initial sequence number chosen by the active opener.
pub const CLIENT_ISN: u32 = 100;
/// Initial sequence number chosen by the passive opener.
pub const SERVER_ISN: u32 = 5000;

/// Tunable protocol parameters for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of in-flight segment slots in the send window.
    pub window_slots: usize,
    /// Payload bytes per segment (and per slot).
    pub max_payload: usize,
    /// Fixed retransmission timeout for an unacknowledged segment.
    pub rto: Duration,
    /// Retransmissions of a single segment before the transfer is abandoned.
    pub max_retries: u32,
    /// Upper bound on one ACK wait inside the sender loop.
    pub poll_interval: Duration,
    /// How long the active opener waits for SYN-ACK.
    pub handshake_timeout: Duration,
    /// Bound on each wait during the FIN exchange.
    pub teardown_timeout: Duration,
    /// Passive side: how long one blocking receive lasts before it is re-entered.
    pub idle_poll: Duration,
    /// Receive window advertised in every outbound segment.
    pub advertised_window: u16,
    /// Initial sequence number for the active opener.
    pub client_isn: u32,
    /// Initial sequence number for the passive opener.
    pub server_isn: u32,
    /// Probability that an inbound data segment is discarded by the loss simulator.
    pub loss_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        let rto = Duration::from_millis(500);
        Self {
            window_slots: 10,
            max_payload: MAX_PAYLOAD,
            rto,
            max_retries: 10,
            poll_interval: Duration::from_millis(100),
            handshake_timeout: rto,
            teardown_timeout: rto,
            idle_poll: Duration::from_secs(2),
            advertised_window: u16::MAX,
            client_isn: CLIENT_ISN,
            server_isn: SERVER_ISN,
            loss_rate: 0.0,
        }
    }
}

impl Config {
    /// Set the retransmission timeout and the timeouts derived from it.
    pub fn with_rto(mut self, rto: Duration) -> Self {
        self.rto = rto;
        self.handshake_timeout = rto;
        self.teardown_timeout = rto;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    pub fn with_window_slots(mut self, window_slots: usize) -> Self {
        self.window_slots = window_slots;
        self
    }

    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate;
        self
    }

    /// Total payload bytes that may be unacknowledged at once.
    pub fn window_bytes(&self) -> u32 {
        (self.window_slots * self.max_payload) as u32
    }

    /// Reject parameter combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(ConfigError::LossRate(self.loss_rate));
        }
        if self.window_slots == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD {
            return Err(ConfigError::Payload(self.max_payload));
        }
        Ok(())
    }
}

/// Invalid [`Config`] values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("loss rate {0} is outside [0, 1]")]
    LossRate(f64),
    #[error("send window must have at least one slot")]
    ZeroWindow,
    #[error("segment payload of {0} bytes is outside 1..=1024")]
    Payload(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let c = Config::default();
        assert_eq!(c.window_slots, 10);
        assert_eq!(c.max_payload, 1024);
        assert_eq!(c.rto, Duration::from_millis(500));
        assert_eq!(c.max_retries, 10);
        assert_eq!(c.poll_interval, Duration::from_millis(100));
        assert_eq!(c.advertised_window, 65535);
        assert_eq!(c.window_bytes(), 10 * 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn with_rto_moves_derived_timeouts() {
        let c = Config::default().with_rto(Duration::from_millis(40));
        assert_eq!(c.handshake_timeout, Duration::from_millis(40));
        assert_eq!(c.teardown_timeout, Duration::from_millis(40));
    }

    #[test]
    fn rejects_bad_loss_rate() {
        assert_eq!(
            Config::default().with_loss_rate(1.5).validate(),
            Err(ConfigError::LossRate(1.5))
        );
        assert!(Config::default().with_loss_rate(-0.1).validate().is_err());
        assert!(Config::default().with_loss_rate(1.0).validate().is_ok());
    }

    #[test]
    fn rejects_empty_window() {
        assert_eq!(
            Config::default().with_window_slots(0).validate(),
            Err(ConfigError::ZeroWindow)
        );
    }
}
