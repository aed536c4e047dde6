use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct CacheSlot {
    value: u64,
    expires_at: Option<Instant>,
    generation: u64,
}

/// Short-lived snapshot of a stock value.
///
/// An entry is valid strictly before its expiry. Every successful write calls
/// [`ReadCache::invalidate`], which drops the entry and bumps a generation counter;
/// a refill that observed an older generation is discarded so a read that
/// started before a write can never re-publish the pre-write value.
///
/// The internal mutex only guards the slot itself and is never held across an
/// `.await`.
pub(crate) struct ReadCache {
    ttl: Duration,
    slot: Mutex<CacheSlot>,
}

impl ReadCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(CacheSlot {
                value: 0,
                expires_at: None,
                generation: 0,
            }),
        }
    }

    /// Cached value, if an unexpired entry exists.
    pub(crate) fn get(&self) -> Option<u64> {
        let slot = self.slot.lock();

        match slot.expires_at {
            Some(expires_at) if Instant::now() < expires_at => Some(slot.value),
            _ => None,
        }
    }

    /// Generation to hand back to [`ReadCache::fill`] after an uncached read.
    pub(crate) fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Store `value` unless an invalidation happened since `observed_generation`.
    pub(crate) fn fill(&self, value: u64, observed_generation: u64) {
        if self.ttl.is_zero() {
            return;
        }

        let mut slot = self.slot.lock();
        if slot.generation != observed_generation {
            return;
        }

        slot.value = value;
        slot.expires_at = Some(Instant::now() + self.ttl);
    }

    pub(crate) fn invalidate(&self) {
        let mut slot = self.slot.lock();
        slot.expires_at = None;
        slot.generation = slot.generation.wrapping_add(1);
    }
}
