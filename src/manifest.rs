use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::FetchStatus;
use crate::error::FinstatError;
use crate::store::CacheStore;

pub const MANIFEST_FILE: &str = "parquet_map.json";

/// Per-run record of what was fetched, keyed by derived year (or by the raw
/// remote path when two files derive the same year). Written fresh on every
/// fetch run, overwriting any previous manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub timestamp: String,
    pub cache_dir: String,
    pub files: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Local path of the cached bytes; empty for `failed` entries.
    pub path: String,
    pub meta: EntryMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub remote_etag: String,
    pub local_hash: String,
    pub status: FetchStatus,
}

impl ManifestEntry {
    pub fn failed(remote_etag: String) -> Self {
        Self {
            path: String::new(),
            meta: EntryMeta {
                remote_etag,
                local_hash: String::new(),
                status: FetchStatus::Failed,
            },
        }
    }

    pub fn is_usable(&self) -> bool {
        self.meta.status != FetchStatus::Failed && !self.path.is_empty()
    }
}

impl Manifest {
    pub fn new(cache_dir: &Utf8Path) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            cache_dir: cache_dir.to_string(),
            files: BTreeMap::new(),
        }
    }

    /// Loads and validates a manifest document; a document that does not
    /// match the schema is rejected rather than trusted downstream.
    pub fn load(path: &Utf8Path) -> Result<Self, FinstatError> {
        if !path.as_std_path().exists() {
            return Err(FinstatError::ManifestNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| FinstatError::ManifestParse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|err| FinstatError::ManifestParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), FinstatError> {
        CacheStore::write_json_atomic(path, self)
    }

    /// Paths of entries that completed successfully, in key order.
    pub fn usable_paths(&self) -> Vec<Utf8PathBuf> {
        self.files
            .values()
            .filter(|entry| entry.is_usable())
            .map(|entry| Utf8PathBuf::from(&entry.path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sample() -> Manifest {
        let mut manifest = Manifest::new(Utf8Path::new("/tmp/cache"));
        manifest.files.insert(
            "2011".to_string(),
            ManifestEntry {
                path: "/tmp/cache/year=2011/part-0.parquet".to_string(),
                meta: EntryMeta {
                    remote_etag: "abc".to_string(),
                    local_hash: "deadbeefdeadbeef".to_string(),
                    status: FetchStatus::Cached,
                },
            },
        );
        manifest
            .files
            .insert("2012".to_string(), ManifestEntry::failed("def".to_string()));
        manifest
    }

    #[test]
    fn roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join(MANIFEST_FILE)).unwrap();

        sample().save(&path).unwrap();
        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded.files.len(), 2);
        assert_eq!(loaded.files["2011"].meta.status, FetchStatus::Cached);
        assert_eq!(loaded.files["2012"].meta.status, FetchStatus::Failed);
    }

    #[test]
    fn failed_entries_are_not_usable() {
        let manifest = sample();
        let usable = manifest.usable_paths();
        assert_eq!(usable.len(), 1);
        assert!(usable[0].as_str().contains("year=2011"));
    }

    #[test]
    fn missing_manifest() {
        let err = Manifest::load(Utf8Path::new("/nonexistent/parquet_map.json")).unwrap_err();
        assert_matches!(err, FinstatError::ManifestNotFound(_));
    }

    #[test]
    fn malformed_manifest_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join(MANIFEST_FILE)).unwrap();
        fs::write(path.as_std_path(), b"{\"files\": 42}").unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert_matches!(err, FinstatError::ManifestParse { .. });
    }
}
