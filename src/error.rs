use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FinstatError {
    #[error("invalid taxpayer id: {0}")]
    InvalidTaxpayerId(String),

    #[error("invalid region tax code: {0}")]
    InvalidRegionCode(String),

    #[error("invalid dataset repo id: {0}")]
    InvalidRepoId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("hub request failed: {0}")]
    HubHttp(String),

    #[error("hub returned status {status}: {message}")]
    HubStatus { status: u16, message: String },

    #[error("hub listing for {repo} contained no parquet files")]
    EmptyListing { repo: String },

    #[error("manifest not found at {0} (run `finstat fetch` first)")]
    ManifestNotFound(Utf8PathBuf),

    #[error("malformed manifest at {path}: {message}")]
    ManifestParse { path: Utf8PathBuf, message: String },

    #[error("manifest contains no usable files")]
    NoUsableFiles,

    #[error("query failed: {0}")]
    Query(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl From<polars::prelude::PolarsError> for FinstatError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        FinstatError::Query(err.to_string())
    }
}
