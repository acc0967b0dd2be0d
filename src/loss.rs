//! Simulated packet loss, applied inline on the send path (after a segment
//! is formed, before it reaches the transport) and on the receive path
//! (immediately after a datagram is pulled off the socket).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

pub struct LossSimulator {
    rng: Mutex<StdRng>,
}

impl LossSimulator {
    pub fn new(seed: u64) -> LossSimulator {
        LossSimulator { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Returns `true` with probability `p` (clamped to `[0.0, 1.0]` by the
    /// caller's CLI validation).
    pub fn maybe_drop(&self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.rng.lock().unwrap().gen_bool(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_probability_never_drops() {
        let sim = LossSimulator::new(1);
        for _ in 0..1000 {
            assert!(!sim.maybe_drop(0.0));
        }
    }

    #[test]
    fn one_probability_always_drops() {
        let sim = LossSimulator::new(1);
        for _ in 0..1000 {
            assert!(sim.maybe_drop(1.0));
        }
    }

    #[test]
    fn same_seed_reproduces_sequence() {
        let a = LossSimulator::new(7);
        let b = LossSimulator::new(7);
        let draws_a: Vec<bool> = (0..50).map(|_| a.maybe_drop(0.5)).collect();
        let draws_b: Vec<bool> = (0..50).map(|_| b.maybe_drop(0.5)).collect();
        assert_eq!(draws_a, draws_b);
    }
}
