use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, LINK, USER_AGENT};
use serde::Deserialize;

use crate::domain::RepoId;
use crate::error::FinstatError;

/// One tabular file as reported by the hub listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub size: u64,
    /// LFS content id when the file is LFS-backed, plain object id otherwise.
    /// Informational only; never verified against local bytes.
    pub etag: String,
}

pub trait HubClient: Send + Sync {
    /// Lists all parquet files in the dataset repo, in listing order.
    fn list_parquet_files(&self, repo: &RepoId) -> Result<Vec<RemoteFile>, FinstatError>;

    /// Fetches current size/content-id metadata for a single file.
    fn file_metadata(&self, repo: &RepoId, path: &str) -> Result<RemoteFile, FinstatError>;

    /// Downloads the file's bytes to `destination`. Callers decide whether
    /// to call this at all when a cached copy already exists.
    fn download(&self, repo: &RepoId, path: &str, destination: &Path)
        -> Result<(), FinstatError>;
}

#[derive(Clone)]
pub struct HubHttpClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    entry_type: String,
    path: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    oid: String,
    #[serde(default)]
    lfs: Option<LfsInfo>,
}

#[derive(Debug, Deserialize)]
struct LfsInfo {
    oid: String,
}

impl TreeEntry {
    fn into_remote_file(self) -> RemoteFile {
        let etag = self.lfs.map(|lfs| lfs.oid).unwrap_or(self.oid);
        RemoteFile {
            path: self.path,
            size: self.size,
            etag,
        }
    }
}

impl HubHttpClient {
    pub fn new() -> Result<Self, FinstatError> {
        Self::with_base_url("https://huggingface.co".to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, FinstatError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("finstat-mirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FinstatError::HubHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| FinstatError::HubHttp(err.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, FinstatError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(FinstatError::HubHttp(err.to_string()));
                }
            }
        }
    }

    fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, FinstatError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "hub request failed".to_string());
            return Err(FinstatError::HubStatus { status, message });
        }
        Ok(response)
    }
}

impl HubClient for HubHttpClient {
    fn list_parquet_files(&self, repo: &RepoId) -> Result<Vec<RemoteFile>, FinstatError> {
        let mut files = Vec::new();
        let mut url = format!(
            "{}/api/datasets/{}/tree/main?recursive=true",
            self.base_url,
            repo.as_str()
        );

        // The tree endpoint paginates via a Link header.
        loop {
            let response = self.send_with_retries(|| self.client.get(&url))?;
            let next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_next_link);
            let response = Self::check_status(response)?;
            let entries: Vec<TreeEntry> = response
                .json()
                .map_err(|err| FinstatError::HubHttp(err.to_string()))?;
            files.extend(
                entries
                    .into_iter()
                    .filter(|entry| entry.entry_type == "file")
                    .filter(|entry| entry.path.ends_with(".parquet"))
                    .map(TreeEntry::into_remote_file),
            );

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        if files.is_empty() {
            return Err(FinstatError::EmptyListing {
                repo: repo.as_str().to_string(),
            });
        }
        Ok(files)
    }

    fn file_metadata(&self, repo: &RepoId, path: &str) -> Result<RemoteFile, FinstatError> {
        let url = format!(
            "{}/api/datasets/{}/paths-info/main",
            self.base_url,
            repo.as_str()
        );
        let body = serde_json::json!({ "paths": [path] });
        let response = self.send_with_retries(|| self.client.post(&url).json(&body))?;
        let response = Self::check_status(response)?;
        let entries: Vec<TreeEntry> = response
            .json()
            .map_err(|err| FinstatError::HubHttp(err.to_string()))?;
        entries
            .into_iter()
            .find(|entry| entry.path == path)
            .map(TreeEntry::into_remote_file)
            .ok_or_else(|| FinstatError::HubHttp(format!("no metadata returned for {path}")))
    }

    fn download(
        &self,
        repo: &RepoId,
        path: &str,
        destination: &Path,
    ) -> Result<(), FinstatError> {
        let url = format!(
            "{}/datasets/{}/resolve/main/{}",
            self.base_url,
            repo.as_str(),
            path
        );
        let response = self.send_with_retries(|| self.client.get(&url))?;
        let mut response = Self::check_status(response)?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| FinstatError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (url, rel) = part.split_once(';')?;
        if rel.trim() != "rel=\"next\"" {
            return None;
        }
        let url = url.trim();
        Some(url.trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_link_parsing() {
        let header = "<https://huggingface.co/api/datasets/x/tree/main?cursor=abc>; rel=\"next\"";
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://huggingface.co/api/datasets/x/tree/main?cursor=abc")
        );
        assert_eq!(parse_next_link("<u>; rel=\"prev\""), None);
    }

    #[test]
    fn etag_prefers_lfs_oid() {
        let entry = TreeEntry {
            entry_type: "file".to_string(),
            path: "year=2011/part-0.parquet".to_string(),
            size: 42,
            oid: "git-oid".to_string(),
            lfs: Some(LfsInfo {
                oid: "lfs-sha".to_string(),
            }),
        };
        assert_eq!(entry.into_remote_file().etag, "lfs-sha");

        let entry = TreeEntry {
            entry_type: "file".to_string(),
            path: "year=2011/part-0.parquet".to_string(),
            size: 42,
            oid: "git-oid".to_string(),
            lfs: None,
        };
        assert_eq!(entry.into_remote_file().etag, "git-oid");
    }
}
