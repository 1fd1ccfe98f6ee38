//! Loader for target manifests under the resource directory.
//!
//! `manifests.json` is a required resource: a bot that cannot load it must
//! halt at startup instead of running without targets.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::core::types::Material;
use crate::error::EngineError;

pub const MANIFESTS_FILE: &str = "manifests.json";

/// One entry of a manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub stackable: bool,
}

impl ManifestItem {
    pub fn material(&self) -> Material {
        Material {
            name: self.name.clone(),
            stackable: self.stackable,
        }
    }
}

/// A named target loadout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub items: Vec<ManifestItem>,
}

/// Manifests keyed by name.
#[derive(Debug, Default)]
pub struct ManifestStore {
    manifests: BTreeMap<String, Manifest>,
}

impl ManifestStore {
    /// Load `<dir>/manifests.json`.
    ///
    /// A missing file or a missing `manifests` key is
    /// [`EngineError::MissingResource`]. An empty list loads fine.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFESTS_FILE);
        if !path.exists() {
            return Err(missing(path, "file not found"));
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let mut doc: Value =
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        let entries = match doc.get_mut("manifests").map(Value::take) {
            Some(Value::Null) | None => return Err(missing(path, "no `manifests` entry")),
            Some(entries) => entries,
        };
        let list: Vec<Manifest> = serde_json::from_value(entries)
            .with_context(|| format!("parse manifests in {}", path.display()))?;

        let manifests: BTreeMap<String, Manifest> =
            list.into_iter().map(|m| (m.name.clone(), m)).collect();
        if manifests.is_empty() {
            info!(path = %path.display(), "no manifests found, continuing anyway");
        } else {
            info!(count = manifests.len(), "loaded manifests");
        }
        Ok(Self { manifests })
    }

    pub fn get(&self, name: &str) -> Option<&Manifest> {
        self.manifests.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.manifests.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

fn missing(path: PathBuf, reason: &str) -> anyhow::Error {
    EngineError::MissingResource {
        path,
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_manifests;

    #[test]
    fn missing_file_is_a_missing_resource() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = ManifestStore::load(temp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MissingResource { .. })
        ));
    }

    #[test]
    fn missing_key_is_a_missing_resource() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(MANIFESTS_FILE), "{\"other\": []}").expect("write");
        let err = ManifestStore::load(temp.path()).unwrap_err();
        assert!(err.to_string().contains("no `manifests` entry"));
    }

    #[test]
    fn empty_list_loads() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(MANIFESTS_FILE), "{\"manifests\": []}").expect("write");
        let store = ManifestStore::load(temp.path()).expect("load");
        assert!(store.is_empty());
    }

    #[test]
    fn loads_manifests_by_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_manifests(
            temp.path(),
            &[Manifest {
                name: "melee".to_string(),
                items: vec![
                    ManifestItem {
                        name: "Sword".to_string(),
                        quantity: 1,
                        stackable: false,
                    },
                    ManifestItem {
                        name: "Coins".to_string(),
                        quantity: 500,
                        stackable: true,
                    },
                ],
            }],
        )
        .expect("write manifests");

        let store = ManifestStore::load(temp.path()).expect("load");
        let melee = store.get("melee").expect("melee manifest");
        assert_eq!(melee.items.len(), 2);
        assert!(melee.items[1].material().stackable);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["melee"]);
    }
}
