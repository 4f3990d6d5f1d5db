//! Dependent-effect registry shared between cells and effects.
//!
//! Each cell owns a [`Dependents`] table mapping effect IDs to weak handles
//! on the effect's core. The table holds only non-owning references, so a
//! cell never keeps a dropped or stopped effect alive; dead entries are
//! pruned whenever the table is snapshotted for a notification pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::effect::EffectCore;

/// Unique identifier for a tracked function.
///
/// Uses an atomic counter to ensure uniqueness across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Weak-handle table of the effects that read a cell during their most
/// recent run.
///
/// Registration is idempotent: re-reading the same cell within one run
/// overwrites the existing entry. The concurrent map lets `get` register a
/// dependent while another thread is snapshotting for a `set`.
#[derive(Default)]
pub(crate) struct Dependents {
    table: DashMap<EffectId, Weak<EffectCore>>,
}

impl Dependents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an effect as a dependent. A second registration for the
    /// same ID is a no-op.
    pub fn register(&self, id: EffectId, core: Weak<EffectCore>) {
        self.table.insert(id, core);
    }

    /// Remove an effect from the table. Absent IDs are ignored.
    pub fn remove(&self, id: EffectId) {
        self.table.remove(&id);
    }

    /// Snapshot the live dependents, sorted by effect ID so one `set` call
    /// delivers in a deterministic order. Entries whose effect has been
    /// dropped are pruned as a side effect.
    pub fn snapshot(&self) -> Vec<Arc<EffectCore>> {
        self.table.retain(|_, weak| weak.strong_count() > 0);
        let mut live: Vec<Arc<EffectCore>> = self
            .table
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();
        live.sort_by_key(|core| core.id());
        live
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_ids_are_unique() {
        let id1 = EffectId::next();
        let id2 = EffectId::next();
        let id3 = EffectId::next();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn registration_is_idempotent() {
        let deps = Dependents::new();
        let id = EffectId::next();

        deps.register(id, Weak::new());
        deps.register(id, Weak::new());

        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn snapshot_prunes_dead_entries() {
        let deps = Dependents::new();
        let id = EffectId::next();

        // A Weak with no live Arc behind it never upgrades.
        deps.register(id, Weak::new());
        assert_eq!(deps.len(), 1);

        let snapshot = deps.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(deps.len(), 0);
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let deps = Dependents::new();
        deps.remove(EffectId::next());
        assert_eq!(deps.len(), 0);
    }
}
