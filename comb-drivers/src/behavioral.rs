use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

/// Half-open integer range `[min, max)` used for pixels and milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub min: u64,
    pub max: u64,
}

impl Span {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }
}

#[derive(Debug)]
/// Produces human-like delays and magnitudes to reduce automation signals.
///
/// Seed it to make a whole run reproducible.
pub struct BehavioralEngine {
    rng: Mutex<StdRng>,
}

impl Default for BehavioralEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BehavioralEngine {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniform sample from `span`; degenerate spans yield `span.min`.
    pub fn sample(&self, span: Span) -> u64 {
        if span.max <= span.min {
            return span.min;
        }
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(span.min..span.max)
    }

    /// Sleep for a random duration in `span` milliseconds; returns the pause taken.
    pub async fn random_delay(&self, span: Span) -> u64 {
        let ms = self.sample(span);
        sleep(Duration::from_millis(ms)).await;
        ms
    }
}
