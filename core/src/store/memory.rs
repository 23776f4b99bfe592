use super::{
    minion_bank, CacheStore, MinionData, MinionId, MinionRegistry, StoreError, DATA_KEY,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::time::Duration;

type Banks = BTreeMap<String, BTreeMap<String, Value>>;

/// In-process [`CacheStore`].
///
/// Writers and matchers may run concurrently.
///
/// ```
/// use serde_json::json;
/// use tgt::{CacheStore, MemoryCache};
///
/// let cache = MemoryCache::new();
/// cache.store_minion("web1", json!({"grains": {"os": "Debian"}})).unwrap();
/// assert_eq!(cache.list("minions").unwrap(), vec!["web1"]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryCache {
    banks: RwLock<Banks>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn store(&self, bank: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.banks
            .write()
            .map_err(poisoned)?
            .entry(bank.to_owned())
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    /// Write a minion's `{grains, pillar}` record into its bank.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn store_minion(&self, id: &str, data: impl Into<Value>) -> Result<(), StoreError> {
        self.store(&minion_bank(id), DATA_KEY, data.into())
    }

    /// Write a typed minion record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn store_minion_data(&self, id: &str, data: &MinionData) -> Result<(), StoreError> {
        let value = serde_json::to_value(data).map_err(|source| StoreError::Decode {
            bank: minion_bank(id),
            key: DATA_KEY.to_owned(),
            source,
        })?;
        self.store_minion(id, value)
    }

    /// Remove one key, or the whole bank (and its sub-banks) when `key` is `None`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn flush(&self, bank: &str, key: Option<&str>) -> Result<(), StoreError> {
        let mut banks = self.banks.write().map_err(poisoned)?;
        match key {
            Some(key) => {
                if let Some(entries) = banks.get_mut(bank) {
                    entries.remove(key);
                    if entries.is_empty() {
                        banks.remove(bank);
                    }
                }
            }
            None => {
                let prefix = format!("{bank}/");
                banks.retain(|name, _| name != bank && !name.starts_with(&prefix));
            }
        }
        Ok(())
    }
}

impl CacheStore for MemoryCache {
    fn list(&self, bank: &str) -> Result<Vec<String>, StoreError> {
        let banks = self.banks.read().map_err(poisoned)?;
        let mut names: BTreeSet<String> = banks
            .get(bank)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();

        let prefix = format!("{bank}/");
        for (name, _) in banks.range(prefix.clone()..) {
            let Some(rest) = name.strip_prefix(&prefix) else {
                break;
            };
            let child = rest.split('/').next().unwrap_or(rest);
            if !child.is_empty() {
                names.insert(child.to_owned());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Never blocks, so `timeout` does not apply.
    fn fetch(
        &self,
        bank: &str,
        key: &str,
        _timeout: Option<Duration>,
    ) -> Result<Option<Value>, StoreError> {
        let banks = self.banks.read().map_err(poisoned)?;
        Ok(banks.get(bank).and_then(|entries| entries.get(key)).cloned())
    }
}

/// In-process [`MinionRegistry`].
///
/// ```
/// use tgt::{MemoryRegistry, MinionRegistry};
///
/// let registry = MemoryRegistry::from_iter(["b", "a"]);
/// registry.register("c");
/// assert_eq!(registry.minions().unwrap().len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    ids: RwLock<BTreeSet<MinionId>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a minion. Returns `false` if it was already known or the lock is poisoned.
    pub fn register(&self, id: impl Into<MinionId>) -> bool {
        self.ids
            .write()
            .map(|mut ids| ids.insert(id.into()))
            .unwrap_or(false)
    }

    /// Forget a minion. Returns `false` if it was unknown or the lock is poisoned.
    pub fn deregister(&self, id: &str) -> bool {
        self.ids
            .write()
            .map(|mut ids| ids.remove(id))
            .unwrap_or(false)
    }
}

impl<S: Into<MinionId>> FromIterator<S> for MemoryRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: RwLock::new(iter.into_iter().map(Into::into).collect()),
        }
    }
}

impl MinionRegistry for MemoryRegistry {
    fn minions(&self) -> Result<BTreeSet<MinionId>, StoreError> {
        self.ids.read().map(|ids| ids.clone()).map_err(poisoned)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}
