use super::types::*;
use crate::pool::ConfigProvider;
use std::path::Path;
use std::sync::Mutex;

/// `apply_env_overrides` reads process-global environment variables, so any
/// test touching `SWITCHBOARD_*` vars must not run concurrently with a test
/// that assumes they are unset.
static ENV_GUARD: Mutex<()> = Mutex::new(());

#[test]
fn defaults_when_file_absent() {
    let _guard = ENV_GUARD.lock().unwrap();
    let cfg = ProxyConfig::load(Path::new("/nonexistent/switchboard.toml")).unwrap();
    assert_eq!(cfg.port, 32000);
    assert_eq!(cfg.request_timeout_seconds, 120);
    assert!(cfg.pool.is_empty());
}

#[test]
fn loads_toml_pool() {
    let toml = r#"
        port = 32001
        request_timeout_seconds = 30

        [[pool]]
        name = "primary"
        base_url = "https://api.example.com"
        credential = "sk-primary"
        static_priority = 0

        [[pool]]
        name = "backup"
        base_url = "https://backup.example.com"
        credential = "sk-backup"
        static_priority = 1
    "#;
    let tmp = std::env::temp_dir().join("switchboard_test_config.toml");
    std::fs::write(&tmp, toml).unwrap();
    let cfg = ProxyConfig::load(&tmp).unwrap();
    std::fs::remove_file(&tmp).ok();

    assert_eq!(cfg.port, 32001);
    assert_eq!(cfg.request_timeout_seconds, 30);
    assert_eq!(cfg.pool.len(), 2);
    assert_eq!(cfg.pool[0].name, "primary");
}

#[test]
fn loads_json_pool() {
    let json = r#"{
        "port": 32002,
        "pool": [
            {"name": "a", "base_url": "https://a.example.com", "credential": "ka", "static_priority": 0}
        ]
    }"#;
    let tmp = std::env::temp_dir().join("switchboard_test_config.json");
    std::fs::write(&tmp, json).unwrap();
    let cfg = ProxyConfig::load(&tmp).unwrap();
    std::fs::remove_file(&tmp).ok();

    assert_eq!(cfg.port, 32002);
    assert_eq!(cfg.pool.len(), 1);
    assert_eq!(cfg.pool[0].credential, "ka");
}

#[test]
fn unsupported_extension_fails() {
    let tmp = std::env::temp_dir().join("switchboard_test_config.yaml");
    std::fs::write(&tmp, "port: 1").unwrap();
    let result = ProxyConfig::load(&tmp);
    std::fs::remove_file(&tmp).ok();
    assert!(result.is_err());
}

#[test]
fn validate_rejects_out_of_range_timeout() {
    let cfg = ProxyConfig {
        request_timeout_seconds: 5,
        ..ProxyConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = ProxyConfig {
        request_timeout_seconds: 700,
        ..ProxyConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn validate_rejects_empty_pool_entry_fields() {
    let cfg = ProxyConfig {
        pool: vec![UpstreamConfig {
            id: None,
            name: String::new(),
            base_url: "https://a".into(),
            credential: "k".into(),
            static_priority: 0,
        }],
        ..ProxyConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn env_override_applies_port_and_timeout() {
    let _guard = ENV_GUARD.lock().unwrap();
    std::env::set_var("SWITCHBOARD_PORT", "40000");
    std::env::set_var("SWITCHBOARD_REQUEST_TIMEOUT_SECONDS", "45");

    let cfg = ProxyConfig::load(Path::new("/nonexistent/switchboard.toml")).unwrap();

    std::env::remove_var("SWITCHBOARD_PORT");
    std::env::remove_var("SWITCHBOARD_REQUEST_TIMEOUT_SECONDS");

    assert_eq!(cfg.port, 40000);
    assert_eq!(cfg.request_timeout_seconds, 45);
}

#[test]
fn config_provider_impl_returns_pool_and_settings() {
    let cfg = ProxyConfig {
        port: 32000,
        request_timeout_seconds: 120,
        pool: vec![UpstreamConfig {
            id: None,
            name: "primary".into(),
            base_url: "https://api.example.com".into(),
            credential: "sk-1".into(),
            static_priority: 0,
        }],
    };

    assert_eq!(cfg.port(), 32000);
    assert_eq!(cfg.request_timeout_seconds(), 120);
    let upstreams = cfg.snapshot_pool();
    assert_eq!(upstreams.len(), 1);
    assert_eq!(upstreams[0].name, "primary");
}
