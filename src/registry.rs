//! Named indexes and their operation counters.
//!
//! A registry is an ordinary value: create one per process (or per test)
//! and hand it the [`IndexStats`] of each index you open.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::Serialize;

use crate::error::{Error, Result};

/// Operation counters for one index. Shared between the index and any
/// registry it is registered with.
#[derive(Debug, Default)]
pub struct IndexStats {
    adds: AtomicU64,
    updates: AtomicU64,
    prepares: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    queries: AtomicU64,
    lookups: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub adds: u64,
    pub updates: u64,
    pub prepares: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub queries: u64,
    pub lookups: u64,
}

impl IndexStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_add(&self) {
        self.adds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_prepare(&self) {
        self.prepares.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            adds: self.adds.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            prepares: self.prepares.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
        }
    }
}

/// Process-level information recorded once by [`IndexRegistry::init`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub name: &'static str,
    pub version: &'static str,
}

impl SystemInfo {
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub system: Option<SystemInfo>,
    pub indexes: BTreeMap<String, StatsSnapshot>,
}

#[derive(Debug, Default)]
pub struct IndexRegistry {
    system: OnceLock<SystemInfo>,
    indexes: Mutex<BTreeMap<String, Arc<IndexStats>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the system entry. Only the first call has an effect; the
    /// return value says whether this call was it.
    pub fn init(&self) -> bool {
        let mut initialized = false;
        self.system.get_or_init(|| {
            initialized = true;
            tracing::debug!("index registry initialized");
            SystemInfo::current()
        });
        initialized
    }

    pub fn is_initialized(&self) -> bool {
        self.system.get().is_some()
    }

    pub fn register(&self, name: &str, stats: Arc<IndexStats>) -> Result<()> {
        let mut indexes = self.lock()?;
        if indexes.contains_key(name) {
            return Err(Error::Registry(format!(
                "index '{name}' is already registered"
            )));
        }
        indexes.insert(name.to_string(), stats);
        Ok(())
    }

    /// Remove `name`, returning its stats if it was registered.
    pub fn unregister(&self, name: &str) -> Result<Option<Arc<IndexStats>>> {
        Ok(self.lock()?.remove(name))
    }

    pub fn get(&self, name: &str) -> Result<Option<Arc<IndexStats>>> {
        Ok(self.lock()?.get(name).cloned())
    }

    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    pub fn snapshot(&self) -> Result<RegistrySnapshot> {
        let indexes = self
            .lock()?
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect();
        Ok(RegistrySnapshot {
            system: self.system.get().cloned(),
            indexes,
        })
    }

    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<String, Arc<IndexStats>>>> {
        self.indexes
            .lock()
            .map_err(|_| Error::Registry("registry lock poisoned".into()))
    }
}
