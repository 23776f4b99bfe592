//! tgt-test: fleet fixtures for conformance testing
//!
//! A [`Fleet`] describes minions, whether they are registered, and the
//! grains and pillar cached for them. It builds the in-memory registry and
//! cache a [`TargetChecker`] runs against.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tgt_test::prelude::*;
//!
//! let fleet = Fleet::new()
//!     .with_grains("alpha", json!({"os": "Debian"}))
//!     .with_minion("beta");
//!
//! let checker = fleet.checker(Opts::default()).unwrap();
//! let result = checker.check_minions("G@os:Debian or beta", TargetType::Compound).unwrap();
//! assert_eq!(result.minion_list(), vec!["alpha", "beta"]);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tgt::{MemoryCache, MemoryRegistry, MinionData, Opts, StoreError, TargetChecker};

#[cfg(feature = "fixtures")]
pub mod fixture;

/// Errors loading a fleet description.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// The file could not be read.
    #[error("cannot read fleet {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not a valid fleet document.
    #[error("invalid fleet: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The in-memory stores rejected a write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One minion of a [`Fleet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetMinion {
    /// Listed by the registry. Unregistered minions only exist in the cache.
    #[serde(default = "registered_default")]
    pub registered: bool,
    /// Cached grains; `None` together with `pillar` means no cache record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grains: Option<Map<String, Value>>,
    /// Cached pillar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pillar: Option<Map<String, Value>>,
}

fn registered_default() -> bool {
    true
}

impl Default for FleetMinion {
    fn default() -> Self {
        Self {
            registered: true,
            grains: None,
            pillar: None,
        }
    }
}

impl FleetMinion {
    /// The cache record, if the minion has one.
    #[must_use]
    pub fn record(&self) -> Option<MinionData> {
        if self.grains.is_none() && self.pillar.is_none() {
            return None;
        }
        Some(MinionData {
            grains: self.grains.clone().unwrap_or_default(),
            pillar: self.pillar.clone().unwrap_or_default(),
        })
    }
}

/// A described fleet of minions.
///
/// ```yaml
/// minions:
///   alpha:
///     grains: {os: Debian, ipv4: [10.0.0.1]}
///     pillar: {role: web}
///   beta: {}
///   retired:
///     registered: false
///     grains: {os: Debian}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fleet {
    /// Minions by ID.
    #[serde(default)]
    pub minions: BTreeMap<String, FleetMinion>,
}

impl Fleet {
    /// An empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a fleet document.
    ///
    /// # Errors
    ///
    /// [`FleetError::Yaml`] on malformed input.
    pub fn from_yaml(yaml: &str) -> Result<Self, FleetError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read a fleet document from disk.
    ///
    /// # Errors
    ///
    /// [`FleetError::Io`] if the file cannot be read, [`FleetError::Yaml`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| FleetError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Add a registered minion without cached data.
    #[must_use]
    pub fn with_minion(mut self, id: impl Into<String>) -> Self {
        self.minions.entry(id.into()).or_default();
        self
    }

    /// Set a minion's cached grains, adding it if needed.
    ///
    /// Non-object values are stored as an empty grains map.
    #[must_use]
    pub fn with_grains(mut self, id: impl Into<String>, grains: Value) -> Self {
        self.minions.entry(id.into()).or_default().grains = Some(into_map(grains));
        self
    }

    /// Set a minion's cached pillar, adding it if needed.
    #[must_use]
    pub fn with_pillar(mut self, id: impl Into<String>, pillar: Value) -> Self {
        self.minions.entry(id.into()).or_default().pillar = Some(into_map(pillar));
        self
    }

    /// Keep a minion's cache record but drop it from the registry.
    #[must_use]
    pub fn unregistered(mut self, id: impl Into<String>) -> Self {
        self.minions.entry(id.into()).or_default().registered = false;
        self
    }

    /// The four-minion fleet used across the targeting scenarios.
    ///
    /// `alpha` and `beta` carry grains and pillar; `gamma` and `iota` are
    /// registered without cached data.
    #[must_use]
    pub fn scenario() -> Self {
        use serde_json::json;
        Self::new()
            .with_grains(
                "alpha",
                json!({
                    "abc": "bar:baz",
                    "os": "Ubuntu",
                    "ipv4": ["127.0.0.1", "10.1.2.3"],
                    "roles": ["web", "lb"],
                }),
            )
            .with_pillar("alpha", json!({"role": "web", "app": {"tier": "front"}}))
            .with_grains(
                "beta",
                json!({
                    "os": "Arch",
                    "ipv4": ["127.0.0.1", "192.168.4.20"],
                    "ipv6": ["::1", "fe80::20"],
                }),
            )
            .with_pillar("beta", json!({"role": "db"}))
            .with_minion("gamma")
            .with_minion("iota")
    }

    /// Registry listing every registered minion.
    #[must_use]
    pub fn registry(&self) -> MemoryRegistry {
        self.minions
            .iter()
            .filter(|(_, m)| m.registered)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Cache holding every minion record.
    ///
    /// # Errors
    ///
    /// Propagates cache write failures.
    pub fn cache(&self) -> Result<MemoryCache, StoreError> {
        let cache = MemoryCache::new();
        for (id, minion) in &self.minions {
            if let Some(data) = minion.record() {
                cache.store_minion_data(id, &data)?;
            }
        }
        Ok(cache)
    }

    /// A checker over this fleet.
    ///
    /// # Errors
    ///
    /// Propagates cache write failures.
    pub fn checker(&self, opts: Opts) -> Result<TargetChecker, StoreError> {
        Ok(TargetChecker::new(
            opts,
            Arc::new(self.registry()),
            Arc::new(self.cache()?),
        ))
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{Fleet, FleetError, FleetMinion};
    pub use tgt::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tgt::{CacheStore, MinionRegistry, TargetType};

    #[test]
    fn yaml_fleet() {
        let fleet = Fleet::from_yaml(
            "minions:\n  alpha:\n    grains: {os: Debian}\n  beta: {}\n  retired:\n    registered: false\n    pillar: {role: old}\n",
        )
        .unwrap();
        let registry = fleet.registry();
        assert_eq!(
            registry.minions().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["alpha", "beta"]
        );
        let cache = fleet.cache().unwrap();
        assert_eq!(cache.list("minions").unwrap(), vec!["alpha", "retired"]);
    }

    #[test]
    fn scenario_fleet() {
        let c = Fleet::scenario().checker(Opts::default()).unwrap();
        let r = c.check_minions("*ta", TargetType::Glob).unwrap();
        assert_eq!(r.minion_list(), vec!["beta", "iota"]);
        let r = c.check_minions("role:web", TargetType::Pillar).unwrap();
        assert_eq!(r.minion_list(), vec!["alpha"]);
    }

    #[test]
    fn builder_keeps_both_halves() {
        let fleet = Fleet::new()
            .with_grains("a", serde_json::json!({"os": "x"}))
            .with_pillar("a", serde_json::json!({"role": "y"}));
        let record = fleet.minions["a"].record().unwrap();
        assert_eq!(record.grains["os"], "x");
        assert_eq!(record.pillar["role"], "y");
        assert!(Fleet::new().with_minion("b").minions["b"].record().is_none());
    }

    #[test]
    fn missing_file() {
        let err = Fleet::load("/nonexistent/fleet.yaml").unwrap_err();
        assert!(matches!(err, FleetError::Io { .. }));
    }
}
