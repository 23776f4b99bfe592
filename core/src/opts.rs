//! Master options consulted by the matchers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading [`Opts`].
#[derive(Debug, thiserror::Error)]
pub enum OptsError {
    /// The file could not be read.
    #[error("failed to read \"{}\": {source}", path.display())]
    Io {
        /// Path given by the caller.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// YAML parse error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// JSON parse error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A nodegroup definition: a compound expression, or its words as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodegroupDef {
    /// `"G@os:Debian and web*"`
    Expr(String),
    /// `["G@os:Debian", "and", "web*"]`
    Words(Vec<String>),
}

impl NodegroupDef {
    /// The definition split into words.
    #[must_use]
    pub fn words(&self) -> Vec<String> {
        match self {
            Self::Expr(s) => s.split_whitespace().map(str::to_owned).collect(),
            Self::Words(w) => w.clone(),
        }
    }
}

impl From<&str> for NodegroupDef {
    fn from(s: &str) -> Self {
        Self::Expr(s.to_owned())
    }
}

/// Options for one [`TargetChecker`](crate::TargetChecker).
///
/// Every field has a default, so an empty document is valid:
///
/// ```
/// use tgt::Opts;
///
/// let opts = Opts::from_yaml("nodegroups:\n  web: 'web* or L@lb1'\n").unwrap();
/// assert_eq!(opts.transport, "zeromq");
/// assert!(opts.minion_data_cache);
/// assert!(opts.nodegroups.contains_key("web"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Opts {
    /// Master transport; selects the accepted-key directory of the PKI registry.
    pub transport: String,
    /// Path to extension modules. Not used by matching.
    pub extension_modules: Option<PathBuf>,
    /// Whether the cache store is authoritative for grain/pillar/ipcidr matching.
    pub minion_data_cache: bool,
    /// Named target expressions.
    pub nodegroups: BTreeMap<String, NodegroupDef>,
    /// Expand `N@` atoms inside compound expressions instead of yielding nothing.
    pub resolve_nodegroups_inline: bool,
    /// Master PKI directory.
    pub pki_dir: Option<PathBuf>,
    /// Cache directory for the filesystem cache store.
    pub cachedir: Option<PathBuf>,
    /// Per-record fetch timeout passed to the cache store.
    pub cache_fetch_timeout_ms: Option<u64>,
    /// Range server address. `R@` targets need a resolver regardless.
    pub range_server: Option<String>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            transport: "zeromq".into(),
            extension_modules: None,
            minion_data_cache: true,
            nodegroups: BTreeMap::new(),
            resolve_nodegroups_inline: false,
            pki_dir: None,
            cachedir: None,
            cache_fetch_timeout_ms: None,
            range_server: None,
        }
    }
}

impl Opts {
    /// Parse from YAML.
    ///
    /// # Errors
    ///
    /// [`OptsError::Yaml`] on malformed input.
    pub fn from_yaml(s: &str) -> Result<Self, OptsError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// [`OptsError::Json`] on malformed input.
    pub fn from_json(s: &str) -> Result<Self, OptsError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    ///
    /// # Errors
    ///
    /// [`OptsError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OptsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| OptsError::Io {
            path: path.to_owned(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Add a nodegroup (builder style).
    #[must_use]
    pub fn with_nodegroup(mut self, name: impl Into<String>, def: impl Into<NodegroupDef>) -> Self {
        self.nodegroups.insert(name.into(), def.into());
        self
    }

    /// The cache fetch timeout, if configured.
    #[must_use]
    pub fn cache_fetch_timeout(&self) -> Option<Duration> {
        self.cache_fetch_timeout_ms.map(Duration::from_millis)
    }
}
