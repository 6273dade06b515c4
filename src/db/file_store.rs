use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AllocationStore, RawPool};
use crate::errors::{FabricError, Result};

/// On-disk layout of one pool file
#[derive(Debug, Serialize, Deserialize)]
struct PoolFile {
    updated_at: DateTime<Utc>,
    #[serde(default)]
    entries: RawPool,
}

/// One JSON file per pool inside a state directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, pool: &str) -> PathBuf {
        self.dir.join(format!("{}.json", pool))
    }
}

fn io_err(pool: &str) -> impl FnOnce(std::io::Error) -> FabricError + '_ {
    move |source| FabricError::StoreIo { pool: pool.to_string(), source }
}

impl AllocationStore for FileStore {
    fn load(&self, pool: &str) -> Result<RawPool> {
        let path = self.path(pool);
        if !path.exists() {
            return Ok(RawPool::new());
        }

        let text = fs::read_to_string(&path).map_err(io_err(pool))?;
        let file: PoolFile = serde_json::from_str(&text)
            .map_err(|source| FabricError::StoreFormat { pool: pool.to_string(), source })?;
        Ok(file.entries)
    }

    /// Writes a sibling temp file and renames it over the pool file so a
    /// crash never leaves a truncated pool behind.
    fn save(&self, pool: &str, entries: &RawPool) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(io_err(pool))?;

        let file = PoolFile { updated_at: Utc::now(), entries: entries.clone() };
        let text = serde_json::to_string_pretty(&file)
            .map_err(|source| FabricError::StoreFormat { pool: pool.to_string(), source })?;

        let tmp = self.dir.join(format!(".{}.json.tmp", pool));
        fs::write(&tmp, text).map_err(io_err(pool))?;
        fs::rename(&tmp, self.path(pool)).map_err(io_err(pool))?;

        tracing::debug!("Wrote {}", self.path(pool).display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_pool_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("state"));
        assert!(store.load("l3vni").unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("state"));

        let mut entries = RawPool::new();
        entries.insert("vlan100".into(), json!({"allocation": "manual", "network_prefix": "10.0.0.0/24"}));
        store.save("vlans_network", &entries).unwrap();

        assert_eq!(store.load("vlans_network").unwrap(), entries);
        assert!(store.dir().join("vlans_network.json").exists());
        assert!(!store.dir().join(".vlans_network.json.tmp").exists());

        let text = fs::read_to_string(store.dir().join("vlans_network.json")).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(raw.get("updated_at").is_some());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("nat_rules.json"), "this is not valid json").unwrap();

        let store = FileStore::new(dir.path());
        assert!(matches!(store.load("nat_rules"), Err(FabricError::StoreFormat { .. })));
    }
}
