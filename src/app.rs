use std::collections::BTreeMap;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::config::ResolvedConfig;
use crate::domain::{year_from_path, FetchStatus};
use crate::error::FinstatError;
use crate::hub::{HubClient, RemoteFile};
use crate::manifest::{EntryMeta, Manifest, ManifestEntry};
use crate::store::CacheStore;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub force: bool,
    pub manifest_path: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Outcome of one successful fetch attempt.
struct AttemptOutcome {
    local_path: Utf8PathBuf,
    local_hash: String,
    remote_etag: String,
}

/// Failure of one fetch attempt. Both kinds are retryable; the caller's
/// retry policy decides when they become terminal.
enum AttemptError {
    Hub(FinstatError),
    SizeMismatch { expected: u64, actual: u64 },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Hub(err) => write!(f, "{err}"),
            AttemptError::SizeMismatch { expected, actual } => {
                write!(
                    f,
                    "size_mismatch: expected {expected} bytes, found {actual}"
                )
            }
        }
    }
}

pub struct App<H: HubClient> {
    store: CacheStore,
    hub: H,
    config: ResolvedConfig,
}

impl<H: HubClient> App<H> {
    pub fn new(store: CacheStore, hub: H, config: ResolvedConfig) -> Self {
        Self { store, hub, config }
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    /// Fetches every parquet file the hub lists for the configured dataset.
    ///
    /// Per-file failures are captured in the manifest and never abort the
    /// run; the manifest is written exactly once, at the end, and contains
    /// one entry per discovered file.
    pub fn fetch(
        &self,
        options: &FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<Manifest, FinstatError> {
        self.store.ensure_cache_root()?;

        let files = self.hub.list_parquet_files(&self.config.repo)?;
        sink.event(ProgressEvent {
            message: format!(
                "discovered {} parquet files in {}",
                files.len(),
                self.config.repo
            ),
            elapsed: None,
        });

        let mut manifest = Manifest::new(self.store.cache_root());
        for (index, file) in files.iter().enumerate() {
            let entry = self.fetch_file(file, options.force, sink);
            let key = manifest_key(&file.path, self.config.base_year, index, &manifest.files);
            manifest.files.insert(key, entry);
        }

        manifest.save(&options.manifest_path)?;
        sink.event(ProgressEvent {
            message: format!(
                "manifest written to {} ({} files)",
                options.manifest_path,
                manifest.files.len()
            ),
            elapsed: None,
        });
        Ok(manifest)
    }

    /// Bounded retry loop around [`Self::attempt_fetch`]. Never propagates a
    /// failure: exhaustion yields a `failed` entry with an empty path.
    fn fetch_file(&self, file: &RemoteFile, force: bool, sink: &dyn ProgressSink) -> ManifestEntry {
        let local_path = self.store.local_path(&self.config.repo, &file.path);
        if force {
            if let Err(err) = self.store.remove_file(&local_path) {
                warn!(path = %local_path, "failed to drop cached copy: {err}");
            }
        }

        let retry = self.config.retry;
        for attempt in 0..retry.max_attempts {
            let start = Instant::now();
            sink.event(ProgressEvent {
                message: format!("attempt {}: {}", attempt + 1, file.path),
                elapsed: None,
            });

            match self.attempt_fetch(file, &local_path) {
                Ok(outcome) => {
                    let status = if attempt == 0 {
                        FetchStatus::Cached
                    } else {
                        FetchStatus::Redownloaded
                    };
                    sink.event(ProgressEvent {
                        message: format!("{}: {status}", file.path),
                        elapsed: Some(start.elapsed()),
                    });
                    return ManifestEntry {
                        path: outcome.local_path.to_string(),
                        meta: EntryMeta {
                            remote_etag: outcome.remote_etag,
                            local_hash: outcome.local_hash,
                            status,
                        },
                    };
                }
                Err(err) => {
                    sink.event(ProgressEvent {
                        message: format!("attempt {} failed: {err}", attempt + 1),
                        elapsed: Some(start.elapsed()),
                    });
                    if attempt + 1 < retry.max_attempts {
                        thread::sleep(retry.backoff_delay(attempt));
                    }
                }
            }
        }

        sink.event(ProgressEvent {
            message: format!("{}: giving up after {} attempts", file.path, retry.max_attempts),
            elapsed: None,
        });
        ManifestEntry::failed(file.etag.clone())
    }

    /// One attempt: refresh remote metadata, ensure local bytes (reusing the
    /// cache when present), verify the on-disk size, fingerprint the bytes.
    fn attempt_fetch(
        &self,
        file: &RemoteFile,
        local_path: &Utf8Path,
    ) -> Result<AttemptOutcome, AttemptError> {
        let meta = self
            .hub
            .file_metadata(&self.config.repo, &file.path)
            .map_err(AttemptError::Hub)?;

        if !self.store.exists(local_path) {
            self.hub
                .download(&self.config.repo, &file.path, local_path.as_std_path())
                .map_err(AttemptError::Hub)?;
        }

        let actual = self.store.file_size(local_path).map_err(AttemptError::Hub)?;
        if actual != meta.size {
            // Drop the bad copy so the next attempt downloads fresh bytes.
            if let Err(err) = self.store.remove_file(local_path) {
                warn!(path = %local_path, "failed to drop mismatched copy: {err}");
            }
            return Err(AttemptError::SizeMismatch {
                expected: meta.size,
                actual,
            });
        }

        let local_hash = self.store.fingerprint(local_path).map_err(AttemptError::Hub)?;
        Ok(AttemptOutcome {
            local_path: local_path.to_path_buf(),
            local_hash,
            remote_etag: meta.etag,
        })
    }
}

/// Manifest key for one discovered file: the `year=YYYY` partition marker
/// when present, base year + discovery index otherwise, and the raw remote
/// path when the derived year is already taken.
fn manifest_key(
    remote_path: &str,
    base_year: i32,
    index: usize,
    existing: &BTreeMap<String, ManifestEntry>,
) -> String {
    let key = match year_from_path(remote_path) {
        Some(year) => year.to_string(),
        None => {
            let fallback = base_year + index as i32;
            warn!(
                path = remote_path,
                "no year marker in path, falling back to positional year {fallback}"
            );
            fallback.to_string()
        }
    };
    if existing.contains_key(&key) {
        warn!(
            path = remote_path,
            "year {key} already recorded, keying duplicate by remote path"
        );
        return remote_path.to_string();
    }
    key
}
