use std::time::Duration;

use tokio::{
    sync::Mutex,
    time::{Instant, sleep_until},
};

/// Spaces consecutive requests from one call site so the beacon node is never
/// flooded. Waiters queue on the internal lock, so the interval also
/// serializes bursts from concurrent downloaders.
#[derive(Debug)]
pub struct RequestGate {
    min_interval: Duration,
    next_allowed: Mutex<Instant>,
}

impl RequestGate {
    pub fn new(min_interval: Duration) -> Self {
        RequestGate {
            min_interval,
            next_allowed: Mutex::new(Instant::now()),
        }
    }

    /// Wait until the gate opens, then reserve the next interval.
    pub async fn tick(&self) {
        let mut next_allowed = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next_allowed > now {
            sleep_until(*next_allowed).await;
        }
        *next_allowed = Instant::now() + self.min_interval;
    }
}
