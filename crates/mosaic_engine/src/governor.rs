use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mosaic_core::ProviderDescriptor;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Per-provider pacing: a minimum gap between call starts and a cap on calls in flight.
#[derive(Debug, Default)]
pub struct Governor {
    slots: Mutex<HashMap<String, Arc<ProviderSlot>>>,
}

#[derive(Debug)]
struct ProviderSlot {
    rate_limit: Duration,
    last_start: tokio::sync::Mutex<Option<Instant>>,
    permits: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
}

/// Held for the duration of one provider call.
#[derive(Debug)]
pub struct GovernorPermit {
    _permit: Option<OwnedSemaphorePermit>,
    slot: Arc<ProviderSlot>,
}

impl Drop for GovernorPermit {
    fn drop(&mut self) {
        self.slot.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Governor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for a concurrency slot, then for the provider's next rate-limit turn.
    /// Waiters are served in arrival order.
    pub async fn acquire(&self, descriptor: &ProviderDescriptor) -> GovernorPermit {
        let slot = self.slot(descriptor);
        let permit = match &slot.permits {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };
        slot.wait_turn().await;
        slot.in_flight.fetch_add(1, Ordering::SeqCst);
        GovernorPermit {
            _permit: permit,
            slot,
        }
    }

    pub fn in_flight(&self, provider_id: &str) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_id)
            .map_or(0, |slot| slot.in_flight.load(Ordering::SeqCst))
    }

    fn slot(&self, descriptor: &ProviderDescriptor) -> Arc<ProviderSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(descriptor.id.clone())
            .or_insert_with(|| {
                Arc::new(ProviderSlot {
                    rate_limit: descriptor.rate_limit,
                    last_start: tokio::sync::Mutex::new(None),
                    permits: descriptor
                        .max_concurrent_requests
                        .map(|max| Arc::new(Semaphore::new(max.max(1)))),
                    in_flight: AtomicUsize::new(0),
                })
            })
            .clone()
    }
}

impl ProviderSlot {
    async fn wait_turn(&self) {
        if self.rate_limit.is_zero() {
            return;
        }
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            tokio::time::sleep_until(previous + self.rate_limit).await;
        }
        *last_start = Some(Instant::now());
    }
}
