use std::fs;

use assert_matches::assert_matches;

use finstat_mirror::config::ConfigLoader;
use finstat_mirror::error::FinstatError;

#[test]
fn explicit_config_file_overrides_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("finstat.json");
    fs::write(
        &path,
        r#"{
            "repo": "someorg/statements",
            "base_year": 2015,
            "max_attempts": 5,
            "backoff_base_ms": 250,
            "query": {
                "taxpayer_id": "770100000000",
                "region_taxcode": "77",
                "years": [2020, 2021]
            }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.repo.as_str(), "someorg/statements");
    assert_eq!(resolved.base_year, 2015);
    assert_eq!(resolved.retry.max_attempts, 5);
    assert_eq!(resolved.retry.backoff_base.as_millis(), 250);
    assert_eq!(resolved.query.taxpayer_id.as_str(), "770100000000");
    assert_eq!(resolved.query.region_taxcode.as_str(), "77");
    assert_eq!(resolved.query.years, vec![2020, 2021]);
}

#[test]
fn partial_config_keeps_remaining_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("finstat.json");
    fs::write(&path, r#"{"base_year": 2000}"#).unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.base_year, 2000);
    assert_eq!(resolved.repo.as_str(), "irlspbru/RFSD");
    assert_eq!(resolved.query.years, vec![2022, 2023]);
}

#[test]
fn missing_explicit_config_is_an_error() {
    let err = ConfigLoader::resolve(Some("/nonexistent/finstat.json")).unwrap_err();
    assert_matches!(err, FinstatError::ConfigRead(_));
}

#[test]
fn malformed_config_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("finstat.json");
    fs::write(&path, b"{not json").unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, FinstatError::ConfigParse(_));
}

#[test]
fn invalid_taxpayer_id_in_config() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("finstat.json");
    fs::write(&path, r#"{"query": {"taxpayer_id": "abc"}}"#).unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, FinstatError::InvalidTaxpayerId(_));
}
