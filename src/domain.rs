use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FinstatError;

/// Russian taxpayer identification number (INN): 10 digits for
/// organizations, 12 for individuals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxpayerId(String);

impl TaxpayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxpayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxpayerId {
    type Err = FinstatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = matches!(normalized.len(), 10 | 12)
            && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(FinstatError::InvalidTaxpayerId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Two-digit federal subject code as used in the `region_taxcode` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCode(String);

impl RegionCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegionCode {
    type Err = FinstatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid =
            normalized.len() == 2 && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(FinstatError::InvalidRegionCode(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Dataset repository id on the hub, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId(String);

impl RepoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory-safe form of the repo id for the cache layout.
    pub fn sanitized(&self) -> String {
        self.0.replace('/', "--")
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RepoId {
    type Err = FinstatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let mut parts = normalized.split('/');
        let is_valid = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !is_valid {
            return Err(FinstatError::InvalidRepoId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Terminal state of one fetched file as recorded in the manifest.
///
/// `Cached` and `Redownloaded` both mean the size check passed; the label
/// only reflects whether it passed on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Cached,
    Redownloaded,
    SizeMismatch,
    Failed,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Cached => write!(f, "cached"),
            FetchStatus::Redownloaded => write!(f, "redownloaded"),
            FetchStatus::SizeMismatch => write!(f, "size_mismatch"),
            FetchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Extracts the partition year from a `year=YYYY` marker in a file path.
///
/// Returns `None` when the marker is absent; callers must treat that as an
/// unknown year, never as year zero.
pub fn year_from_path(path: &str) -> Option<i32> {
    let re = Regex::new(r"year=(\d{4})").unwrap();
    re.captures(path)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
