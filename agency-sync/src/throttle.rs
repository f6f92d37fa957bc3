use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Gate awaited before each call of a tight query loop.
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn acquire(&self);
}

/// Lets one caller through per `interval`; the first acquire never waits.
pub struct FixedIntervalGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>
}

impl FixedIntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None)
        }
    }

    /// A zero rate disables the gate.
    pub fn per_second(requests: u32) -> Self {
        if requests == 0 {
            return Self::new(Duration::ZERO);
        }
        Self::new(Duration::from_secs(1) / requests)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Throttle for FixedIntervalGate {
    async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next_slot {
            Some(slot) if slot > now => {
                tokio::time::sleep_until(slot).await;
                slot
            }
            _ => now
        };
        *next_slot = Some(slot + self.interval);
    }
}

pub struct Unthrottled;

#[async_trait]
impl Throttle for Unthrottled {
    async fn acquire(&self) {}
}
