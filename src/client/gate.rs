//! Reference counting of engine consumers.
//!
//! The engine refuses to tear down while any subscriber is registered.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::SubscriberId;

// ============================================================================
// SubscriberGate
// ============================================================================

/// Per-id use counts.
#[derive(Debug, Default)]
pub struct SubscriberGate {
    counts: Mutex<FxHashMap<SubscriberId, usize>>,
}

impl SubscriberGate {
    /// Creates an empty gate.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the count for `id`. Returns the new count.
    pub fn add(&self, id: SubscriberId) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry(id.clone()).or_insert(0);
        *count += 1;
        trace!(subscriber = %id, count = *count, "Subscriber added");
        *count
    }

    /// Decrements the count for `id`, dropping the entry at zero.
    ///
    /// Returns the remaining count. Unknown ids are ignored.
    pub fn remove(&self, id: &SubscriberId) -> usize {
        let mut counts = self.counts.lock();
        let Some(count) = counts.get_mut(id) else {
            return 0;
        };

        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            counts.remove(id);
        }
        trace!(subscriber = %id, remaining, "Subscriber removed");
        remaining
    }

    /// Count for `id`.
    #[must_use]
    pub fn count(&self, id: &SubscriberId) -> usize {
        self.counts.lock().get(id).copied().unwrap_or(0)
    }

    /// Number of distinct subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.lock().len()
    }

    /// Returns `true` if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.lock().is_empty()
    }
}

// ============================================================================
// SubscriberGuard
// ============================================================================

/// Keeps one subscription alive; releases it on drop.
#[derive(Debug)]
#[must_use = "the subscription ends when the guard is dropped"]
pub struct SubscriberGuard {
    gate: Arc<SubscriberGate>,
    id: SubscriberId,
}

impl SubscriberGuard {
    pub(crate) fn new(gate: Arc<SubscriberGate>, id: SubscriberId) -> Self {
        gate.add(id.clone());
        Self { gate, id }
    }

    /// The subscriber id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.gate.remove(&self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================
