use kiln_config::{ConfigError, ConfigLoader, Validate};
use std::fs;

#[test]
fn test_load_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiln.toml");
    fs::write(
        &path,
        r#"
        [server]
        port = 8088
        gzip = false

        [limits]
        request_lines = 50

        [router]
        sort_interval_secs = 10
        "#,
    )
    .unwrap();

    let config = ConfigLoader::auto(&path).unwrap().load_file(&path).unwrap();
    assert_eq!(config.server.port, 8088);
    assert!(!config.server.gzip);
    assert_eq!(config.limits.request_lines, 50);
    assert_eq!(config.router.sort_interval_secs, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let result = ConfigLoader::auto(&path).unwrap().load_file(&path);
    assert!(matches!(result, Err(ConfigError::LoadError(_))));
}

#[test]
fn test_loaded_invalid_config_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kiln.json");
    fs::write(&path, r#"{"server": {"workers": 0}}"#).unwrap();

    let config = ConfigLoader::auto(&path).unwrap().load_file(&path).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}
