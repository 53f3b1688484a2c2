//! Per-gateway uplink rate estimation
//!
//! [`RateCounter`] is a one-minute exponentially weighted moving average.
//! Events are recorded as they happen and folded into the average on each
//! tick, so the reported rate only moves when the periodic sweep runs. The
//! first tick seeds the average with the instantaneous rate.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default decay tick period
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Averaging window of the EWMA
const WINDOW_SECS: f64 = 60.0;

#[derive(Debug, Default)]
struct EwmaState {
    /// Events per second
    rate: f64,
    initialized: bool,
}

/// Decaying event-rate estimate for one gateway
#[derive(Debug)]
pub struct RateCounter {
    uncounted: AtomicU64,
    state: Mutex<EwmaState>,
    interval_secs: f64,
    alpha: f64,
}

impl RateCounter {
    /// Counter ticked every [`TICK_INTERVAL`]
    pub fn new() -> Self {
        Self::with_interval(TICK_INTERVAL)
    }

    /// Counter ticked every `interval`
    pub fn with_interval(interval: Duration) -> Self {
        let interval_secs = interval.as_secs_f64().max(f64::EPSILON);
        Self {
            uncounted: AtomicU64::new(0),
            state: Mutex::new(EwmaState::default()),
            interval_secs,
            alpha: 1.0 - (-interval_secs / WINDOW_SECS).exp(),
        }
    }

    /// Record `n` events
    pub fn update(&self, n: u64) {
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    /// Fold the events recorded since the last tick into the average
    pub fn tick(&self) {
        let count = self.uncounted.swap(0, Ordering::Relaxed);
        let instant_rate = count as f64 / self.interval_secs;

        let mut state = self.state.lock();
        if state.initialized {
            state.rate += self.alpha * (instant_rate - state.rate);
        } else {
            state.rate = instant_rate;
            state.initialized = true;
        }
    }

    /// Current average in events per minute
    pub fn rate_per_minute(&self) -> f64 {
        self.state.lock().rate * WINDOW_SECS
    }

    /// Record one event and decide whether it fits under `ceiling`
    ///
    /// `ceiling` is in events per minute; zero, less or NaN admits everything.
    pub fn admit(&self, ceiling: f64) -> bool {
        self.update(1);
        !(ceiling > 0.0 && self.rate_per_minute() > ceiling)
    }
}

impl Default for RateCounter {
    fn default() -> Self {
        Self::new()
    }
}
