//! Leak and double-destroy bookkeeping for API objects.
//!
//! A [`ResourceTracker`] is an ordinary value: create one per device, per
//! test, or not at all, and hand it to whatever creates objects.

use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Snapshot of a tracker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub created: usize,
    pub destroyed: usize,
    /// Destroy reports for objects that were not live.
    pub invalid_destroys: usize,
}

impl TrackerStats {
    pub const fn live(&self) -> usize {
        self.created - self.destroyed
    }
}

#[derive(Default)]
struct Inner {
    live: HashMap<(vk::ObjectType, u64), &'static str>,
    stats: TrackerStats,
}

/// Records object creation and destruction.
#[derive(Default)]
pub struct ResourceTracker {
    inner: Mutex<Inner>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly created object.
    pub fn created<H: Handle>(&self, handle: H, label: &'static str) {
        let mut inner = self.inner.lock();
        let key = (H::TYPE, handle.as_raw());
        if inner.live.insert(key, label).is_some() {
            tracing::error!("{label} {:#x} created twice without destroy", key.1);
        }
        inner.stats.created += 1;
    }

    /// Record an object's destruction. Returns `false` if it was not live.
    pub fn destroyed<H: Handle>(&self, handle: H) -> bool {
        let mut inner = self.inner.lock();
        let key = (H::TYPE, handle.as_raw());
        if inner.live.remove(&key).is_some() {
            inner.stats.destroyed += 1;
            true
        } else {
            tracing::error!("{:?} {:#x} destroyed but not live", key.0, key.1);
            inner.stats.invalid_destroys += 1;
            false
        }
    }

    /// Whether the object is currently live.
    pub fn is_live<H: Handle>(&self, handle: H) -> bool {
        self.inner.lock().live.contains_key(&(H::TYPE, handle.as_raw()))
    }

    pub fn stats(&self) -> TrackerStats {
        self.inner.lock().stats
    }

    /// Log every object still live and return how many there are.
    pub fn report_leaks(&self) -> usize {
        let inner = self.inner.lock();
        for ((_, raw), label) in &inner.live {
            tracing::error!("Leaked {label} {raw:#x}");
        }
        inner.live.len()
    }
}
