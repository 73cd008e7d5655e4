//! Config module tests

use std::path::PathBuf;

use crate::config::{ApiConfig, Config, DEFAULT_BASE_URL, StorageConfig};

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.storage.backend, "file");
    assert!(config.storage.path.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_toml_roundtrip() {
    let mut config = Config::default();
    config.storage.path = Some(PathBuf::from("/tmp/eventhub/session.json"));

    let serialized = toml::to_string_pretty(&config).expect("Should serialize");
    assert!(serialized.contains("[api]"));
    assert!(serialized.contains("base_url"));

    let parsed: Config = toml::from_str(&serialized).expect("Should deserialize");
    assert_eq!(parsed, config);
}

#[test]
fn test_config_parses_without_storage_path() {
    let parsed: Config = toml::from_str(
        r#"
        [api]
        base_url = "https://tickets.example.com"
        timeout_secs = 10

        [storage]
        backend = "memory"
        "#,
    )
    .expect("Should deserialize");

    assert_eq!(parsed.api.base_url, "https://tickets.example.com");
    assert_eq!(parsed.storage.backend, "memory");
    assert!(parsed.storage.path.is_none());
}

#[test]
fn test_config_get_known_keys() {
    let config = Config {
        api: ApiConfig {
            base_url: "https://api.example.com".to_string(),
            timeout_secs: 5,
        },
        storage: StorageConfig {
            backend: "keyring".to_string(),
            path: Some(PathBuf::from("/var/lib/eventhub/session.json")),
        },
    };

    assert_eq!(config.get("api.base_url").unwrap(), "https://api.example.com");
    assert_eq!(config.get("api.timeout_secs").unwrap(), "5");
    assert_eq!(config.get("storage.backend").unwrap(), "keyring");
    assert_eq!(
        config.get("storage.path").unwrap(),
        "/var/lib/eventhub/session.json"
    );
}

#[test]
fn test_config_get_unknown_key() {
    let config = Config::default();
    let err = config.get("api.nope").unwrap_err();
    assert!(err.to_string().contains("Unknown configuration key"));
}

#[test]
fn test_config_set_base_url_trims_trailing_slash() {
    let mut config = Config::default();
    config.set("api.base_url", "https://api.example.com/").unwrap();
    assert_eq!(config.api.base_url, "https://api.example.com");
}

#[test]
fn test_config_set_rejects_invalid_values() {
    let mut config = Config::default();

    assert!(config.set("api.base_url", "ftp://example.com").is_err());
    assert!(config.set("api.timeout_secs", "0").is_err());
    assert!(config.set("api.timeout_secs", "soon").is_err());
    assert!(config.set("storage.backend", "cloud").is_err());
    assert!(config.set("whatever", "1").is_err());

    assert_eq!(config, Config::default());
}

#[test]
fn test_config_set_storage_path_clears_on_empty() {
    let mut config = Config::default();
    config.set("storage.path", "/tmp/s.json").unwrap();
    assert_eq!(config.storage.path, Some(PathBuf::from("/tmp/s.json")));

    config.set("storage.path", "").unwrap();
    assert!(config.storage.path.is_none());
}

#[test]
fn test_config_validate_rejects_bad_backend() {
    let mut config = Config::default();
    config.storage.backend = "s3".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("Invalid storage backend"));
}

#[test]
fn test_config_list_covers_all_keys() {
    let mut config = Config::default();
    config.storage.path = Some(PathBuf::from("/tmp/session.json"));

    let keys: Vec<String> = config
        .list()
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();

    assert_eq!(
        keys,
        vec![
            "api.base_url",
            "api.timeout_secs",
            "storage.backend",
            "storage.path"
        ]
    );
}
