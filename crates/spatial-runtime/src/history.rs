//! Per-agent interaction history shared between episodes.
//!
//! Episodes may run in parallel, so the history sits behind an
//! `Arc<RwLock<…>>`. Writers only ever insert: nothing is removed, so
//! concurrent episodes cannot lose each other's updates.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use spatial_types::ObjectRecord;
use tracing::debug;

/// Append-only map of object id → interaction kinds performed on it.
#[derive(Debug, Clone, Default)]
pub struct InteractionHistory {
    inner: Arc<RwLock<BTreeMap<String, BTreeSet<String>>>>,
}

impl InteractionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `kind` (e.g. `"pickup"`) was performed on `object_id`.
    ///
    /// Returns `true` when the entry is new.
    pub fn record(&self, object_id: &str, kind: &str) -> bool {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let inserted = map
            .entry(object_id.to_string())
            .or_default()
            .insert(kind.to_string());
        debug!(object_id, kind, inserted, "interaction recorded");
        inserted
    }

    /// True when any interaction was recorded for `object_id`.
    pub fn contains(&self, object_id: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(object_id).is_some_and(|kinds| !kinds.is_empty())
    }

    /// Interaction kinds recorded for `object_id`.
    pub fn kinds(&self, object_id: &str) -> BTreeSet<String> {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(object_id).cloned().unwrap_or_default()
    }

    /// True when `obj` was handled before, either according to this history
    /// or its own scene-provided `interaction_history`.
    pub fn was_used(&self, obj: &ObjectRecord) -> bool {
        !obj.interaction_history.is_empty() || self.contains(&obj.id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_types::{BoundingSize, Vec3};

    #[test]
    fn record_is_idempotent() {
        let h = InteractionHistory::new();
        assert!(h.record("Apple|1", "pickup"));
        assert!(!h.record("Apple|1", "pickup"));
        assert!(h.record("Apple|1", "slice"));
        assert_eq!(h.kinds("Apple|1").len(), 2);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let h = InteractionHistory::new();
        let other = h.clone();
        other.record("Cup|1", "fill");
        assert!(h.contains("Cup|1"));
    }

    #[test]
    fn scene_history_counts_as_used() {
        let h = InteractionHistory::new();
        let obj = ObjectRecord::new("Cup|1", "Cup", Vec3::zero(), BoundingSize::new(0.1, 0.1, 0.1))
            .with_interaction("pickup");
        assert!(h.was_used(&obj));
        let fresh = ObjectRecord::new("Cup|2", "Cup", Vec3::zero(), BoundingSize::new(0.1, 0.1, 0.1));
        assert!(!h.was_used(&fresh));
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let h = InteractionHistory::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let h = h.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        h.record(&format!("Obj|{i}"), &format!("kind{j}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(h.len(), 8);
        assert!((0..8).all(|i| h.kinds(&format!("Obj|{i}")).len() == 50));
    }
}
