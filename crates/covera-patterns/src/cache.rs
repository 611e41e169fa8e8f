//! Memoization shared between queries.
//!
//! An [`ExhaustivenessCache`] is owned by the caller and may be shared by
//! any number of threads checking switches against the same
//! [`TypeUniverse`]. All tables are compute-if-absent: a lookup miss
//! computes the value without holding a shard lock and then inserts it,
//! keeping whichever value landed first. Values are pure functions of their
//! keys, so a racing duplicate computation is harmless.
//!
//! The cache remembers the [`TypeUniverse::id`] it was filled from and drops
//! everything when it is used with a different universe. It must not be
//! shared by queries on two different universes at the same time.

use crate::missing::RecordVerdict;
use crate::reduce::ReduceResult;
use crate::{NominalType, PatternSet};
use covera_types::{ClassId, TypeUniverse};
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Selector plus pattern set.
pub(crate) type ReduceKey = (NominalType, PatternSet);

/// Memo tables for one type universe.
pub struct ExhaustivenessCache {
    anchor: Mutex<Option<u64>>,
    pub(crate) reduce: FxDashMap<ReduceKey, ReduceResult>,
    pub(crate) reduce_classes: FxDashMap<ReduceKey, ReduceResult>,
    /// Keyed by the deconstructions of a set, before and after unwrapping
    pub(crate) unwrap: FxDashMap<PatternSet, PatternSet>,
    pub(crate) records: FxDashMap<ReduceKey, RecordVerdict>,
    pub(crate) permitted: FxDashMap<ClassId, Arc<[ClassId]>>,
    pub(crate) leaves: FxDashMap<ClassId, Arc<[ClassId]>>,
    pub(crate) all_permitted: FxDashMap<ClassId, Arc<[ClassId]>>,
    pub(crate) sealed_path: FxDashMap<(ClassId, ClassId), bool>,
}

impl ExhaustivenessCache {
    pub fn new() -> Self {
        Self {
            anchor: Mutex::new(None),
            reduce: DashMap::default(),
            reduce_classes: DashMap::default(),
            unwrap: DashMap::default(),
            records: DashMap::default(),
            permitted: DashMap::default(),
            leaves: DashMap::default(),
            all_permitted: DashMap::default(),
            sealed_path: DashMap::default(),
        }
    }

    /// Bind the cache to `universe`, dropping entries filled from another one.
    pub fn sync_with(&self, universe: &TypeUniverse) {
        let mut anchor = self.anchor.lock();
        if *anchor == Some(universe.id()) {
            return;
        }
        if let Some(previous) = *anchor {
            debug!(
                previous,
                current = universe.id(),
                "Type universe changed, clearing exhaustiveness cache"
            );
            self.clear_tables();
        }
        *anchor = Some(universe.id());
    }

    /// Drop every memoized entry.
    pub fn clear(&self) {
        let mut anchor = self.anchor.lock();
        self.clear_tables();
        *anchor = None;
    }

    fn clear_tables(&self) {
        self.reduce.clear();
        self.reduce_classes.clear();
        self.unwrap.clear();
        self.records.clear();
        self.permitted.clear();
        self.leaves.clear();
        self.all_permitted.clear();
        self.sealed_path.clear();
    }

    /// Total number of memoized entries.
    pub fn len(&self) -> usize {
        self.reduce.len()
            + self.reduce_classes.len()
            + self.unwrap.len()
            + self.records.len()
            + self.permitted.len()
            + self.leaves.len()
            + self.all_permitted.len()
            + self.sealed_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExhaustivenessCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExhaustivenessCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExhaustivenessCache")
            .field("anchor", &*self.anchor.lock())
            .field("entries", &self.len())
            .finish()
    }
}

pub(crate) fn lookup<K, V, S>(map: &DashMap<K, V, S>, key: &K) -> Option<V>
where
    K: Eq + Hash,
    V: Clone,
    S: BuildHasher + Clone,
{
    map.get(key).map(|entry| entry.value().clone())
}

/// Insert unless present; returns the value that ended up in the map.
pub(crate) fn remember<K, V, S>(map: &DashMap<K, V, S>, key: K, value: V) -> V
where
    K: Eq + Hash,
    V: Clone,
    S: BuildHasher + Clone,
{
    map.entry(key).or_insert(value).value().clone()
}

/// Cooperative cancellation flag, checked once per reduction iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
