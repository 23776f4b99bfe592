//! Injected collaborators: the per-minion data cache and the minion registry.
//!
//! Matchers never reach for global state. A [`TargetChecker`](crate::TargetChecker)
//! is handed a [`MinionRegistry`] (who exists) and a [`CacheStore`] (what each
//! minion last reported), plus an optional [`RangeResolver`].
//!
//! Cache layout: bank `minions` lists every minion with cached data; the record
//! for minion `<id>` lives in bank `minions/<id>` under key `data`.

mod fs;
mod memory;

pub use fs::{FsCache, PkiRegistry};
pub use memory::{MemoryCache, MemoryRegistry};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

/// Opaque minion identifier.
pub type MinionId = String;

/// Bank listing every minion with cached data.
pub const MINIONS_BANK: &str = "minions";

/// Key of a minion's record inside its bank.
pub const DATA_KEY: &str = "data";

/// Bank holding the record of one minion.
#[must_use]
pub fn minion_bank(id: &str) -> String {
    format!("{MINIONS_BANK}/{id}")
}

/// Errors raised by store adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A stored record is not valid JSON.
    #[error("corrupt record {bank}/{key}: {source}")]
    Decode {
        /// Bank of the record.
        bank: String,
        /// Key of the record.
        key: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A fetch did not complete within the caller's timeout.
    #[error("timed out fetching {bank}/{key}")]
    Timeout {
        /// Bank of the record.
        bank: String,
        /// Key of the record.
        key: String,
    },

    /// The backend cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Enumerates the minions known to the fleet.
pub trait MinionRegistry: Send + Sync + Debug {
    /// All accepted minion IDs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the registry cannot be read.
    fn minions(&self) -> Result<BTreeSet<MinionId>, StoreError>;
}

/// Bank/key store of cached minion data.
///
/// Implementations must tolerate concurrent writers; readers may observe a
/// slightly stale snapshot.
pub trait CacheStore: Send + Sync + Debug {
    /// Keys and sub-banks directly under `bank`. An unknown bank is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn list(&self, bank: &str) -> Result<Vec<String>, StoreError>;

    /// Fetch one record, or `None` if it does not exist.
    ///
    /// `timeout` bounds backends that can block on I/O. Local stores answer
    /// immediately and may ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] when a backend honours `timeout` and it
    /// elapses, or another [`StoreError`] if the backend fails.
    fn fetch(
        &self,
        bank: &str,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, StoreError>;
}

/// Resolves `R@` range-server expressions.
pub trait RangeResolver: Send + Sync + Debug {
    /// Expand `expr` into minion IDs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the range service fails.
    fn expand(&self, expr: &str) -> Result<BTreeSet<MinionId>, StoreError>;
}

/// A minion's cached record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinionData {
    /// Grains snapshot.
    #[serde(default)]
    pub grains: Map<String, Value>,
    /// Pillar snapshot.
    #[serde(default)]
    pub pillar: Map<String, Value>,
}

/// Fetch and decode the record for `id`.
///
/// # Errors
///
/// Propagates fetch failures and returns [`StoreError::Decode`] for a record
/// that does not have the expected shape.
pub fn fetch_minion_data(
    cache: &dyn CacheStore,
    id: &str,
    timeout: Option<Duration>,
) -> Result<Option<MinionData>, StoreError> {
    let bank = minion_bank(id);
    let Some(value) = cache.fetch(&bank, DATA_KEY, timeout)? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            bank,
            key: DATA_KEY.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minion_data_defaults() {
        let data: MinionData = serde_json::from_value(json!({"grains": {"os": "Arch"}})).unwrap();
        assert_eq!(data.grains["os"], "Arch");
        assert!(data.pillar.is_empty());
    }

    #[test]
    fn fetch_minion_data_decodes() {
        let cache = MemoryCache::new();
        cache
            .store(&minion_bank("web1"), DATA_KEY, json!({"pillar": {"role": "web"}}))
            .unwrap();
        let data = fetch_minion_data(&cache, "web1", None).unwrap().unwrap();
        assert_eq!(data.pillar["role"], "web");
        assert!(fetch_minion_data(&cache, "web2", None).unwrap().is_none());
    }

    #[test]
    fn fetch_minion_data_rejects_bad_shape() {
        let cache = MemoryCache::new();
        cache
            .store(&minion_bank("web1"), DATA_KEY, json!({"grains": "nope"}))
            .unwrap();
        let err = fetch_minion_data(&cache, "web1", None).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
        assert!(err.to_string().contains("minions/web1/data"));
    }
}
