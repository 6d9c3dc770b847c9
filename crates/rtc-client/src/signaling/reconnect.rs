//! Reconnect pacing for the signaling link
//!
//! A [`ReconnectionPolicy`] is configuration; each outage walks a fresh
//! [`Backoff`] schedule built from it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the channel paces reconnects after the relay link is lost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectionPolicy {
    /// Attempts per outage before `reconnect_failed` (default: 5)
    pub max_retries: u32,
    /// Delay before the first attempt, in ms (default: 1000)
    pub backoff_initial_ms: u64,
    /// Ceiling for any single delay, in ms (default: 30000)
    pub backoff_max_ms: u64,
    /// Growth factor between attempts (default: 2.0)
    pub backoff_multiplier: f64,
    /// Add up to 25% random extra delay (default: true)
    pub jitter_enabled: bool,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_initial_ms: 1000,
            backoff_max_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_enabled: true,
        }
    }
}

impl ReconnectionPolicy {
    /// Schedule for one outage, jitter seeded from the clock
    pub fn schedule(&self) -> Backoff {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9e37_79b9_7f4a_7c15);
        self.schedule_seeded(seed)
    }

    /// Schedule with a fixed jitter seed; the same seed yields the same delays
    pub fn schedule_seeded(&self, seed: u64) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempts: 0,
            // xorshift has a fixed point at zero
            rng: seed | 1,
        }
    }

    /// Delay before the given 0-based attempt, without jitter
    fn base_delay_ms(&self, attempt: u32) -> f64 {
        let grown = self.backoff_initial_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        grown.min(self.backoff_max_ms as f64)
    }
}

/// Delays for the attempts of a single outage
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectionPolicy,
    attempts: u32,
    rng: u64,
}

impl Backoff {
    /// Attempts handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_retries {
            return None;
        }

        let base = self.policy.base_delay_ms(self.attempts);
        self.attempts += 1;

        let jitter = if self.policy.jitter_enabled {
            base * 0.25 * self.next_unit()
        } else {
            0.0
        };
        Some(Duration::from_millis((base + jitter) as u64))
    }

    /// Uniform value in [0, 1)
    fn next_unit(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}
