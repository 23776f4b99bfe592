use super::{CacheStore, MinionId, MinionRegistry, StoreError};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// [`CacheStore`] over a directory tree: bank `a/b`, key `k` is `<root>/a/b/k.json`.
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    /// Use `root` as the cache directory. It does not need to exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one record, creating the bank directory as needed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] on filesystem failure, [`StoreError::Unavailable`]
    /// for a bank or key that would escape the cache directory.
    pub fn store(&self, bank: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let dir = self.bank_dir(bank)?;
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(key_file(key)?);
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Decode {
            bank: bank.to_owned(),
            key: key.to_owned(),
            source,
        })?;
        std::fs::write(&path, bytes).map_err(|source| StoreError::Io { path, source })
    }

    fn bank_dir(&self, bank: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(bank);
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if bank.is_empty() || !safe {
            return Err(StoreError::Unavailable(format!("invalid bank '{bank}'")));
        }
        Ok(self.root.join(rel))
    }
}

fn key_file(key: &str) -> Result<String, StoreError> {
    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
        return Err(StoreError::Unavailable(format!("invalid key '{key}'")));
    }
    Ok(format!("{key}.json"))
}

impl CacheStore for FsCache {
    fn list(&self, bank: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.bank_dir(bank)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if is_dir {
                names.insert(name);
            } else if let Some(stem) = name.strip_suffix(".json") {
                names.insert(stem.to_owned());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Reads a local file; `timeout` does not apply.
    fn fetch(
        &self,
        bank: &str,
        key: &str,
        _timeout: Option<Duration>,
    ) -> Result<Option<Value>, StoreError> {
        let path = self.bank_dir(bank)?.join(key_file(key)?);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                bank: bank.to_owned(),
                key: key.to_owned(),
                source,
            })
    }
}

/// [`MinionRegistry`] backed by the accepted-key directory of the master's PKI.
///
/// Each accepted minion is a file named after its ID under
/// `<pki_dir>/minions` (or `<pki_dir>/accepted` for transports other than
/// `zeromq` and `tcp`). Dotfiles and directories are ignored.
#[derive(Debug, Clone)]
pub struct PkiRegistry {
    dir: PathBuf,
}

impl PkiRegistry {
    /// Registry for `pki_dir` under the given transport.
    pub fn new(pki_dir: impl AsRef<Path>, transport: &str) -> Self {
        let acc = match transport {
            "zeromq" | "tcp" => "minions",
            _ => "accepted",
        };
        Self {
            dir: pki_dir.as_ref().join(acc),
        }
    }

    /// Directory whose file names are the accepted minion IDs.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MinionRegistry for PkiRegistry {
    fn minions(&self) -> Result<BTreeSet<MinionId>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(dir = %self.dir.display(), "no accepted-key directory");
                return Ok(BTreeSet::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut ids = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && entry.file_type().is_ok_and(|t| t.is_file()) {
                ids.insert(name);
            }
        }
        Ok(ids)
    }
}
