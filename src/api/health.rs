//! Shared health state for the /health endpoint.
//! Updated by the game service on each submission and settlement.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared health counters. Updated by the game service, read by the API.
#[derive(Default)]
pub struct HealthState {
    /// Guesses accepted since startup.
    pub guesses_submitted: AtomicU64,
    /// Nanosecond timestamp of the last accepted guess (0 = none).
    pub last_guess_at_ns: AtomicU64,
    /// Dates settled with an actual open since startup.
    pub settlements: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_guess(&self, at_ns: u64) {
        self.guesses_submitted.fetch_add(1, Ordering::Relaxed);
        self.last_guess_at_ns.store(at_ns, Ordering::Relaxed);
    }

    pub fn record_settlement(&self) {
        self.settlements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn guesses_submitted(&self) -> u64 {
        self.guesses_submitted.load(Ordering::Relaxed)
    }

    pub fn last_guess_at_ns(&self) -> u64 {
        self.last_guess_at_ns.load(Ordering::Relaxed)
    }

    pub fn settlements(&self) -> u64 {
        self.settlements.load(Ordering::Relaxed)
    }
}
