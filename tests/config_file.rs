use corvid_core::{CorvidConfig, ReviewLevel};

#[test]
fn config_loads_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".corvid.toml");
    std::fs::write(
        &path,
        "[review]\nmax_files = 7\nreview_level = \"comprehensive\"\n",
    )
    .unwrap();

    let config = CorvidConfig::from_file(&path).unwrap();
    assert_eq!(config.review.max_files, 7);
    assert_eq!(config.review.review_level, ReviewLevel::Comprehensive);
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(CorvidConfig::from_file(&path).is_err());
}

#[test]
fn invalid_bounds_in_file_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".corvid.toml");
    std::fs::write(&path, "[review]\nconcurrency = 0\n").unwrap();
    assert!(CorvidConfig::from_file(&path).is_err());
}
