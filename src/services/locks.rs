//! In-process keyed locks serialising operations on the same project.
//!
//! Ingestion locks its candidate slug and database name; rename and delete
//! lock the project id plus every slug and database name they touch. Keys
//! are always acquired in sorted order so two operations cannot deadlock.
//! These locks only cover this process; the engine's own create semantics
//! and the catalog's unique indexes remain the authoritative guards.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Registry of named async mutexes.
#[derive(Clone, Default)]
pub struct OperationLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Holds a set of keys until dropped.
pub struct OperationGuard {
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
    registry: Arc<Mutex<LockMap>>,
}

impl OperationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_key(id: Uuid) -> String {
        format!("project:{}", id)
    }

    pub fn slug_key(slug: &str) -> String {
        format!("slug:{}", slug)
    }

    pub fn database_key(name: &str) -> String {
        format!("db:{}", name.to_lowercase())
    }

    /// Wait until every key is free and hold them all.
    pub async fn acquire<I>(&self, keys: I) -> OperationGuard
    where
        I: IntoIterator<Item = String>,
    {
        let keys: Vec<String> = keys.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut map = lock_map(&self.inner);
            keys.iter()
                .map(|k| map.entry(k.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }

        OperationGuard {
            keys,
            guards,
            registry: self.inner.clone(),
        }
    }

    /// Number of keys currently tracked.
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        lock_map(&self.inner).len()
    }
}

fn lock_map(map: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.guards.clear();
        let mut map = lock_map(&self.registry);
        for key in &self.keys {
            // Only the registry still references an idle mutex.
            if map.get(key).is_some_and(|m| Arc::strong_count(m) == 1) {
                map.remove(key);
            }
        }
    }
}
