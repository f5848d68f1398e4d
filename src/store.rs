use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use sha2::{Digest, Sha256};

use crate::domain::RepoId;
use crate::error::FinstatError;

/// Local byte cache for downloaded dataset files, laid out as
/// `<cache_root>/<repo-sanitized>/<remote path>` so the hub's partition
/// markers (`year=YYYY`) survive into the local path.
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_root: Utf8PathBuf,
}

impl CacheStore {
    pub fn new() -> Result<Self, FinstatError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("finstat-mirror"))
                    .ok()
            })
            .ok_or_else(|| {
                FinstatError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn local_path(&self, repo: &RepoId, remote_path: &str) -> Utf8PathBuf {
        self.cache_root.join(repo.sanitized()).join(remote_path)
    }

    pub fn ensure_cache_root(&self) -> Result<(), FinstatError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| FinstatError::Filesystem(err.to_string()))
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn file_size(&self, path: &Utf8Path) -> Result<u64, FinstatError> {
        let meta = fs::metadata(path.as_std_path())
            .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        Ok(meta.len())
    }

    pub fn remove_file(&self, path: &Utf8Path) -> Result<(), FinstatError> {
        if path.as_std_path().exists() {
            fs::remove_file(path.as_std_path())
                .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    /// Truncated SHA-256 of the file's bytes, 16 hex chars. Informational
    /// only; never compared against a hub-side hash.
    pub fn fingerprint(&self, path: &Utf8Path) -> Result<String, FinstatError> {
        let bytes = fs::read(path.as_std_path())
            .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        let digest = Sha256::digest(&bytes);
        let mut encoded = hex::encode(digest);
        encoded.truncate(16);
        Ok(encoded)
    }

    pub fn write_json_atomic<T: serde::Serialize>(
        path: &Utf8Path,
        value: &T,
    ) -> Result<(), FinstatError> {
        let parent = path
            .parent()
            .ok_or_else(|| FinstatError::Filesystem("invalid manifest path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("finstat-manifest")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), &content)
            .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_keeps_partition_markers() {
        let store = CacheStore::new_with_root(Utf8PathBuf::from("/tmp/cache"));
        let repo: RepoId = "irlspbru/RFSD".parse().unwrap();
        let path = store.local_path(&repo, "RFSD/year=2011/part-0.parquet");
        assert_eq!(
            path.as_str(),
            "/tmp/cache/irlspbru--RFSD/RFSD/year=2011/part-0.parquet"
        );
    }

    #[test]
    fn json_writes_use_unique_scratch_files() {
        let temp = tempfile::tempdir().unwrap();
        let target = Utf8PathBuf::from_path_buf(temp.path().join("parquet_map.json")).unwrap();
        // Another writer's scratch file at the obvious fixed name must be
        // neither published nor clobbered.
        let stale = temp.path().join("parquet_map.json.tmp");
        fs::write(&stale, b"half-written manifest from another run").unwrap();

        CacheStore::write_json_atomic(&target, &serde_json::json!({ "ok": true })).unwrap();

        let written = fs::read_to_string(target.as_std_path()).unwrap();
        assert!(written.contains("\"ok\""));
        assert_eq!(
            fs::read(&stale).unwrap(),
            b"half-written manifest from another run"
        );
    }

    #[test]
    fn fingerprint_is_truncated_sha256() {
        let temp = tempfile::tempdir().unwrap();
        let file = Utf8PathBuf::from_path_buf(temp.path().join("data.bin")).unwrap();
        fs::write(file.as_std_path(), b"hello").unwrap();

        let store = CacheStore::new_with_root(
            Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap(),
        );
        let hash = store.fingerprint(&file).unwrap();
        // sha256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(hash, "2cf24dba5fb0a30e");
    }
}
