//! Keyed single-writer locks.
//!
//! Every read-modify-write of a Bond document runs while holding the lock for
//! its `PairKey`, so two interactions for the same pair (or an interaction and
//! a decay step) are applied one after the other instead of racing. The
//! Constellation engine keys the same table type by realm.
//! Locks are not reentrant: never call back into a locking operation for the
//! same key while holding its guard.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::PairKey;

/// Table size above which idle entries are pruned on the next acquire.
const PRUNE_ABOVE: usize = 1024;

/// One async mutex per key, created on first use.
pub struct KeyedLocks<K> {
    table: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Locks for Bond documents.
pub type PairLocks = KeyedLocks<PairKey>;

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { table: Mutex::new(HashMap::new()) }
    }
}

impl<K> fmt::Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLocks").field("len", &self.table.lock().len()).finish()
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut table = self.table.lock();
            if table.len() > PRUNE_ABOVE {
                // An entry nobody holds or waits on has exactly one owner: the table.
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            table.entry(key.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
