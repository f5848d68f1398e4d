use std::time::{Duration, Instant};

use polars::prelude::*;
use polars::sql::SQLContext;
use serde::Serialize;
use tracing::debug;

use crate::config::{QueryParams, ResolvedConfig};
use crate::domain::year_from_path;
use crate::error::FinstatError;
use crate::manifest::Manifest;

/// One aggregation answer from one engine, with its wall-clock duration.
#[derive(Debug, Clone, Serialize)]
pub struct EngineResult<T> {
    pub value: T,
    pub elapsed_ms: f64,
}

/// The same question answered by both engines. `agree` is a bit-for-bit
/// comparison after both paths cast to f64.
#[derive(Debug, Clone, Serialize)]
pub struct QueryComparison<T> {
    pub sql: EngineResult<T>,
    pub lazy: EngineResult<T>,
    pub agree: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyRow {
    pub year: Option<i32>,
    pub line_1700: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    /// Per-company balance line over the years, for the configured taxpayer.
    pub company: QueryComparison<Vec<CompanyRow>>,
    /// Revenue sum over the configured (years, region) filter.
    pub revenue: QueryComparison<Option<f64>>,
}

pub struct Analyzer {
    config: ResolvedConfig,
}

impl Analyzer {
    pub fn new(config: ResolvedConfig) -> Self {
        Self { config }
    }

    /// Builds the unified year-tagged lazy view over the manifest's usable
    /// files and answers both fixed questions through both engines.
    pub fn analyze(&self, manifest: &Manifest) -> Result<AnalyzeReport, FinstatError> {
        let paths = manifest.usable_paths();
        if paths.is_empty() {
            return Err(FinstatError::NoUsableFiles);
        }

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            frames.push(year_tagged_frame(path.as_str())?);
        }
        let unified = concat(frames, UnionArgs::default())?;

        let params = &self.config.query;
        let company = self.company_query(&unified, params)?;
        let revenue = self.revenue_query(&unified, params)?;

        Ok(AnalyzeReport { company, revenue })
    }

    /// `(year, line_1700)` for one taxpayer, ordered by year.
    fn company_query(
        &self,
        unified: &LazyFrame,
        params: &QueryParams,
    ) -> Result<QueryComparison<Vec<CompanyRow>>, FinstatError> {
        let sql_text = format!(
            "SELECT year, CAST(line_1700 AS DOUBLE) AS line_1700 \
             FROM statements \
             WHERE inn = '{}' \
             ORDER BY year",
            params.taxpayer_id
        );
        let (sql_df, sql_elapsed) = run_sql(unified, &sql_text)?;

        let start = Instant::now();
        let lazy_df = unified
            .clone()
            .filter(col("inn").eq(lit(params.taxpayer_id.as_str())))
            .select([col("year"), col("line_1700").cast(DataType::Float64)])
            .sort(["year"], Default::default())
            .collect()?;
        let lazy_elapsed = start.elapsed();

        let sql = EngineResult {
            value: company_rows(&sql_df)?,
            elapsed_ms: millis(sql_elapsed),
        };
        let lazy = EngineResult {
            value: company_rows(&lazy_df)?,
            elapsed_ms: millis(lazy_elapsed),
        };
        let agree = sql.value == lazy.value;
        debug!(rows = sql.value.len(), agree, "company query done");
        Ok(QueryComparison { sql, lazy, agree })
    }

    /// Sum of `line_2100` over the configured years and region. Rows with a
    /// null year never match the year filter in either engine.
    fn revenue_query(
        &self,
        unified: &LazyFrame,
        params: &QueryParams,
    ) -> Result<QueryComparison<Option<f64>>, FinstatError> {
        let year_list = params
            .years
            .iter()
            .map(|year| year.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let sql_text = format!(
            "SELECT SUM(CAST(line_2100 AS DOUBLE)) AS total \
             FROM statements \
             WHERE year IN ({year_list}) AND region_taxcode = '{}'",
            params.region_taxcode
        );
        let (sql_df, sql_elapsed) = run_sql(unified, &sql_text)?;

        let year_filter = params
            .years
            .iter()
            .map(|year| col("year").eq(lit(*year)))
            .reduce(|acc, expr| acc.or(expr))
            .unwrap_or_else(|| lit(false));

        let start = Instant::now();
        let lazy_df = unified
            .clone()
            .filter(year_filter.and(col("region_taxcode").eq(lit(params.region_taxcode.as_str()))))
            .select([col("line_2100").cast(DataType::Float64).sum().alias("total")])
            .collect()?;
        let lazy_elapsed = start.elapsed();

        let sql = EngineResult {
            value: scalar_f64(&sql_df, "total")?,
            elapsed_ms: millis(sql_elapsed),
        };
        let lazy = EngineResult {
            value: scalar_f64(&lazy_df, "total")?,
            elapsed_ms: millis(lazy_elapsed),
        };
        let agree = sql.value == lazy.value;
        debug!(total = ?sql.value, agree, "revenue query done");
        Ok(QueryComparison { sql, lazy, agree })
    }
}

/// Lazily scans one cached parquet file and tags it with its partition year.
/// Files without a `year=YYYY` marker get a null year, which later year
/// filters exclude rather than coercing to zero.
fn year_tagged_frame(path: &str) -> Result<LazyFrame, FinstatError> {
    let frame = LazyFrame::scan_parquet(path, ScanArgsParquet::default())?;
    let year_expr = match year_from_path(path) {
        Some(year) => lit(year),
        None => lit(NULL),
    };
    Ok(frame.with_column(year_expr.cast(DataType::Int32).alias("year")))
}

/// Runs one SQL statement against a fresh, scoped context with the unified
/// view registered as `statements`.
fn run_sql(unified: &LazyFrame, sql_text: &str) -> Result<(DataFrame, Duration), FinstatError> {
    let mut ctx = SQLContext::new();
    ctx.register("statements", unified.clone());
    let start = Instant::now();
    let df = ctx.execute(sql_text)?.collect()?;
    Ok((df, start.elapsed()))
}

fn company_rows(df: &DataFrame) -> Result<Vec<CompanyRow>, FinstatError> {
    let years = df.column("year")?.i32()?;
    let values = df.column("line_1700")?.f64()?;
    Ok(years
        .into_iter()
        .zip(values)
        .map(|(year, line_1700)| CompanyRow { year, line_1700 })
        .collect())
}

fn scalar_f64(df: &DataFrame, name: &str) -> Result<Option<f64>, FinstatError> {
    Ok(df.column(name)?.f64()?.get(0))
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
