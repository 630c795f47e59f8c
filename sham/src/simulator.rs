//! Synthetic packet loss for exercising retransmission.
//!
//! [`LossSimulator`] is consulted once per inbound **data** segment at the
//! receiving side.  It discards the segment with a fixed probability,
//! independently per segment.  Control segments (SYN, ACK, FIN) never pass
//! through it.
//!
//! The random source is seeded once when the simulator is created; pass an
//! explicit seed for reproducible runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ConfigError;

/// Probabilistic drop decision for inbound data segments.
#[derive(Debug)]
pub struct LossSimulator {
    loss_rate: f64,
    rng: StdRng,
}

impl LossSimulator {
    /// A simulator dropping with probability `loss_rate`, seeded from the OS.
    pub fn new(loss_rate: f64) -> Result<Self, ConfigError> {
        Self::with_rng(loss_rate, StdRng::from_os_rng())
    }

    /// A simulator with a fixed seed.
    pub fn seeded(loss_rate: f64, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(loss_rate, StdRng::seed_from_u64(seed))
    }

    /// A simulator that never drops.
    pub fn disabled() -> Self {
        Self {
            loss_rate: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    fn with_rng(loss_rate: f64, rng: StdRng) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&loss_rate) {
            return Err(ConfigError::LossRate(loss_rate));
        }
        Ok(Self { loss_rate, rng })
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    /// `true` when the current segment should be discarded.
    pub fn should_drop(&mut self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        self.rng.random_bool(self.loss_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_never_drops() {
        let mut sim = LossSimulator::seeded(0.0, 7).unwrap();
        assert!((0..10_000).all(|_| !sim.should_drop()));
        let mut off = LossSimulator::disabled();
        assert!(!off.should_drop());
    }

    #[test]
    fn full_rate_always_drops() {
        let mut sim = LossSimulator::seeded(1.0, 7).unwrap();
        assert!((0..1_000).all(|_| sim.should_drop()));
    }

    #[test]
    fn drop_frequency_tracks_rate() {
        let mut sim = LossSimulator::seeded(0.25, 0xBAD5EED).unwrap();
        let drops = (0..20_000).filter(|_| sim.should_drop()).count();
        // 25% of 20k = 5000; allow a generous band.
        assert!((4_500..5_500).contains(&drops), "drops = {drops}");
    }

    #[test]
    fn same_seed_same_decisions() {
        let mut a = LossSimulator::seeded(0.5, 42).unwrap();
        let mut b = LossSimulator::seeded(0.5, 42).unwrap();
        let da: Vec<bool> = (0..64).map(|_| a.should_drop()).collect();
        let db: Vec<bool> = (0..64).map(|_| b.should_drop()).collect();
        assert_eq!(da, db);
    }

    #[test]
    fn out_of_range_rate_rejected() {
        assert!(LossSimulator::new(1.01).is_err());
        assert!(LossSimulator::seeded(-0.5, 1).is_err());
    }
}
