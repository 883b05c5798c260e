//! Configuration loading and layering tests

use std::io::Write;

use serial_test::serial;
use tempora::config::Config;

#[test]
#[serial]
fn test_from_env_defaults() {
    std::env::remove_var("TEMPORA_BIND_ADDRESS");
    std::env::remove_var("TEMPORA_HOLD_TTL_SECS");

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.bind_address, "127.0.0.1:8080");
    assert_eq!(config.redis.hold_ttl_secs, 300);
    assert_eq!(config.engine.default_granularity_min, 30);
}

#[test]
#[serial]
fn test_env_overrides() {
    std::env::set_var("TEMPORA_BIND_ADDRESS", "0.0.0.0:9999");
    std::env::set_var("TEMPORA_HOLD_TTL_SECS", "60");
    std::env::set_var("TEMPORA_CLAIM_TTL_SECS", "45");

    let config = Config::from_env().unwrap();
    assert_eq!(config.server.bind_address, "0.0.0.0:9999");
    assert_eq!(config.redis.hold_ttl_secs, 60);
    assert_eq!(config.claims.claim_ttl_secs, 45);

    std::env::remove_var("TEMPORA_BIND_ADDRESS");
    std::env::remove_var("TEMPORA_HOLD_TTL_SECS");
    std::env::remove_var("TEMPORA_CLAIM_TTL_SECS");
}

#[test]
#[serial]
fn test_file_then_env_layering() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        [server]
        bind_address = "127.0.0.1:7000"
        enable_cors = true
        enable_request_logging = false

        [redis]
        url = "redis://cache:6379"
        pool_size = 4
        hold_ttl_secs = 120
        key_prefix = "booking"
        "#
    )
    .unwrap();

    std::env::set_var("TEMPORA_HOLD_TTL_SECS", "90");

    let config = Config::from_file(file.path()).unwrap();
    // File value
    assert_eq!(config.server.bind_address, "127.0.0.1:7000");
    assert_eq!(config.redis.key_prefix, "booking");
    // Environment wins over file
    assert_eq!(config.redis.hold_ttl_secs, 90);
    // Untouched section keeps defaults
    assert_eq!(config.engine.default_granularity_min, 30);

    std::env::remove_var("TEMPORA_HOLD_TTL_SECS");
}

#[test]
#[serial]
fn test_invalid_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "this is not toml at all [").unwrap();
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    std::env::set_var("TEMPORA_BIND_ADDRESS", "not-an-address");
    assert!(Config::from_env().is_err());
    std::env::remove_var("TEMPORA_BIND_ADDRESS");
}
