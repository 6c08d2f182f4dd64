//! Per-endpoint request pacing: a monotonic-clock token computation
//! that waits until `last_call_time + (1 / rate)` has passed before
//! letting a caller through. The first call never waits.

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// A single endpoint's rate limiter: at most `rate` calls per second.
pub struct Limiter {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Limiter {
    /// Construct a limiter allowing at most `calls_per_second` calls per
    /// second. Panics if `calls_per_second` is not positive.
    pub fn new(calls_per_second: f64) -> Self {
        assert!(calls_per_second > 0.0, "rate must be positive");
        Self {
            interval: Duration::from_secs_f64(1.0 / calls_per_second),
            last_call: Mutex::new(None),
        }
    }

    /// Wait until this limiter's next slot is available, then record the
    /// new call time. The first call through a fresh limiter never waits.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;

        let now = Instant::now();
        if let Some(previous) = *last_call {
            let earliest = previous + self.interval;
            if earliest > now {
                sleep(earliest - now).await;
            }
        }

        *last_call = Some(Instant::now());
    }
}

/// The two logical endpoints a [`crate::session::Session`] paces
/// independently: CDX search and memento playback.
pub struct Pacer {
    search: Limiter,
    memento: Limiter,
}

impl Pacer {
    pub fn new(search_calls_per_second: f64, memento_calls_per_second: f64) -> Self {
        Self {
            search: Limiter::new(search_calls_per_second),
            memento: Limiter::new(memento_calls_per_second),
        }
    }

    pub async fn pace_search(&self) {
        self.search.acquire().await;
    }

    pub async fn pace_memento(&self) {
        self.memento.acquire().await;
    }
}

impl Default for Pacer {
    /// Library defaults: 1 call/sec for search, 30 calls/sec for
    /// memento fetches.
    fn default() -> Self {
        Self::new(1.0, 30.0)
    }
}
