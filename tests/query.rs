use std::fs;
use std::fs::File;
use std::path::Path;

use camino::Utf8Path;
use polars::prelude::*;

use finstat_mirror::config::{Config, ConfigLoader};
use finstat_mirror::domain::FetchStatus;
use finstat_mirror::manifest::{EntryMeta, Manifest, ManifestEntry};
use finstat_mirror::query::Analyzer;

/// Writes one yearly extract with the columns the queries touch.
fn write_extract(
    path: &Path,
    inn: Vec<&str>,
    region: Vec<&str>,
    line_1700: Vec<f64>,
    line_2100: Vec<f64>,
) {
    let mut frame = df!(
        "inn" => inn,
        "region_taxcode" => region,
        "line_1700" => line_1700,
        "line_2100" => line_2100,
    )
    .unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = File::create(path).unwrap();
    ParquetWriter::new(file).finish(&mut frame).unwrap();
}

fn entry(path: &Path) -> ManifestEntry {
    ManifestEntry {
        path: path.to_str().unwrap().to_string(),
        meta: EntryMeta {
            remote_etag: "etag".to_string(),
            local_hash: "0123456789abcdef".to_string(),
            status: FetchStatus::Cached,
        },
    }
}

/// Cached extracts for several years plus one file without a year marker.
/// Returns the manifest the analyzer will consume.
fn fixture(temp: &Path) -> Manifest {
    let y2011 = temp.join("year=2011").join("part-0.parquet");
    write_extract(
        &y2011,
        vec!["5905000214", "7701000000"],
        vec!["59", "77"],
        vec![90.0, 11.0],
        vec![123.0, 456.0],
    );

    let y2022 = temp.join("year=2022").join("part-0.parquet");
    write_extract(
        &y2022,
        vec!["5905000214", "5902000000", "7701000000"],
        vec!["59", "59", "77"],
        vec![100.5, 1.0, 2.0],
        vec![200.25, 300.75, 999.0],
    );

    let y2023 = temp.join("year=2023").join("part-0.parquet");
    write_extract(
        &y2023,
        vec!["5905000214", "5902000000"],
        vec!["59", "59"],
        vec![110.0, 3.0],
        vec![400.5, 50.0],
    );

    // No year marker: its rows must never satisfy a year filter.
    let unmarked = temp.join("extras").join("part-0.parquet");
    write_extract(
        &unmarked,
        vec!["5902000000"],
        vec!["59"],
        vec![7.0],
        vec![10000.0],
    );

    let mut manifest = Manifest::new(Utf8Path::new(temp.to_str().unwrap()));
    manifest.files.insert("2011".to_string(), entry(&y2011));
    manifest.files.insert("2022".to_string(), entry(&y2022));
    manifest.files.insert("2023".to_string(), entry(&y2023));
    manifest
        .files
        .insert("extras".to_string(), entry(&unmarked));
    manifest
        .files
        .insert("2013".to_string(), ManifestEntry::failed("gone".to_string()));
    manifest
}

fn analyzer() -> Analyzer {
    Analyzer::new(ConfigLoader::resolve_config(Config::default()).unwrap())
}

#[test]
fn both_engines_agree_on_revenue_sum() {
    let temp = tempfile::tempdir().unwrap();
    let manifest = fixture(temp.path());

    let report = analyzer().analyze(&manifest).unwrap();

    // Years {2022, 2023}, region 59: 200.25 + 300.75 + 400.5 + 50.0.
    // The 2011 row, region 77 rows and the unmarked (null-year) file are out.
    assert_eq!(report.revenue.sql.value, Some(951.5));
    assert_eq!(report.revenue.lazy.value, Some(951.5));
    assert!(report.revenue.agree);
}

#[test]
fn company_lookup_matches_across_engines() {
    let temp = tempfile::tempdir().unwrap();
    let manifest = fixture(temp.path());

    let report = analyzer().analyze(&manifest).unwrap();

    let years: Vec<Option<i32>> = report
        .company
        .sql
        .value
        .iter()
        .map(|row| row.year)
        .collect();
    assert_eq!(years, vec![Some(2011), Some(2022), Some(2023)]);

    let values: Vec<Option<f64>> = report
        .company
        .sql
        .value
        .iter()
        .map(|row| row.line_1700)
        .collect();
    assert_eq!(values, vec![Some(90.0), Some(100.5), Some(110.0)]);

    assert_eq!(report.company.sql.value, report.company.lazy.value);
    assert!(report.company.agree);
}

#[test]
fn failed_entries_are_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let manifest = fixture(temp.path());

    // The failed 2013 entry has no bytes on disk; analysis must not touch it.
    let report = analyzer().analyze(&manifest).unwrap();
    assert!(report.revenue.agree);
}

#[test]
fn manifest_with_only_failures_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let mut manifest = Manifest::new(Utf8Path::new(temp.path().to_str().unwrap()));
    manifest
        .files
        .insert("2011".to_string(), ManifestEntry::failed("x".to_string()));

    let err = analyzer().analyze(&manifest).unwrap_err();
    assert!(matches!(
        err,
        finstat_mirror::error::FinstatError::NoUsableFiles
    ));
}
