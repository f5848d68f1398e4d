use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{RegionCode, RepoId, TaxpayerId};
use crate::error::FinstatError;

/// On-disk shape of the optional `finstat.json` config file. Every field
/// defaults to the values the tool was originally built around, so the file
/// is only needed to deviate from them.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub base_year: Option<i32>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,
    #[serde(default)]
    pub query: Option<QueryConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub taxpayer_id: Option<String>,
    #[serde(default)]
    pub region_taxcode: Option<String>,
    #[serde(default)]
    pub years: Option<Vec<i32>>,
}

/// Bounded retry policy for per-file fetch attempts. The delay is a pure
/// function of the attempt index: `base * 2^attempt`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryParams {
    pub taxpayer_id: TaxpayerId,
    pub region_taxcode: RegionCode,
    pub years: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub repo: RepoId,
    pub base_year: i32,
    pub cache_dir: Option<Utf8PathBuf>,
    pub retry: RetryPolicy,
    pub query: QueryParams,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `finstat.json` (or an explicit path). A missing default file is
    /// not an error: the resolved config then carries the built-in values.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FinstatError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from("finstat.json"),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| FinstatError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FinstatError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FinstatError> {
        let repo: RepoId = config
            .repo
            .as_deref()
            .unwrap_or(DEFAULT_REPO)
            .parse()?;
        let base_year = config.base_year.unwrap_or(DEFAULT_BASE_YEAR);

        let mut retry = RetryPolicy::default();
        if let Some(max_attempts) = config.max_attempts {
            retry.max_attempts = max_attempts.max(1);
        }
        if let Some(base_ms) = config.backoff_base_ms {
            retry.backoff_base = Duration::from_millis(base_ms);
        }

        let query = config.query.unwrap_or_default();
        let query = QueryParams {
            taxpayer_id: query
                .taxpayer_id
                .as_deref()
                .unwrap_or(DEFAULT_TAXPAYER_ID)
                .parse()?,
            region_taxcode: query
                .region_taxcode
                .as_deref()
                .unwrap_or(DEFAULT_REGION_TAXCODE)
                .parse()?,
            years: query.years.unwrap_or_else(|| DEFAULT_YEARS.to_vec()),
        };

        Ok(ResolvedConfig {
            repo,
            base_year,
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            retry,
            query,
        })
    }
}

const DEFAULT_REPO: &str = "irlspbru/RFSD";
const DEFAULT_BASE_YEAR: i32 = 2011;
const DEFAULT_TAXPAYER_ID: &str = "5905000214";
const DEFAULT_REGION_TAXCODE: &str = "59";
const DEFAULT_YEARS: [i32; 2] = [2022, 2023];
