//! Tests for configuration validation

use prometheus_task_engine::config::pool::{
    ENV_CONCURRENCY, ENV_DEFAULT_TIMEOUT_MS, ENV_POLL_INTERVAL_MS,
};
use prometheus_task_engine::config::PoolConfig;
use prometheus_task_engine::core::{Pool, PoolError};
use std::time::Duration;

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig {
        concurrency: 4,
        default_timeout_ms: 0,
        poll_interval_ms: 10,
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_concurrency() {
    let invalid = PoolConfig {
        concurrency: 0,
        default_timeout_ms: 0,
        poll_interval_ms: 10,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_poll_interval() {
    let invalid = PoolConfig::new().with_poll_interval_ms(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_rejects_invalid_config() {
    let err = Pool::new(PoolConfig::new().with_concurrency(0)).unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(_)));
}

#[test]
fn test_durations() {
    let cfg = PoolConfig::new()
        .with_default_timeout_ms(1_500)
        .with_poll_interval_ms(25);
    assert_eq!(cfg.default_timeout(), Duration::from_millis(1_500));
    assert_eq!(cfg.poll_interval(), Duration::from_millis(25));
}

#[test]
fn test_from_json_str() {
    let cfg = PoolConfig::from_json_str(r#"{"concurrency": 3, "default_timeout_ms": 200}"#).unwrap();
    assert_eq!(cfg.concurrency, 3);
    assert_eq!(cfg.default_timeout_ms, 200);
    assert_eq!(cfg.poll_interval_ms, 10);

    assert!(PoolConfig::from_json_str(r#"{"concurrency": 0}"#).is_err());
    assert!(PoolConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_round_trips_through_json() {
    let cfg = PoolConfig::new().with_concurrency(7);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(PoolConfig::from_json_str(&json).unwrap(), cfg);
}

// The only test in this binary that touches the environment.
#[test]
fn test_from_env_overrides() {
    std::env::set_var(ENV_CONCURRENCY, " 5 ");
    std::env::set_var(ENV_DEFAULT_TIMEOUT_MS, "250");
    std::env::remove_var(ENV_POLL_INTERVAL_MS);
    let cfg = PoolConfig::from_env().unwrap();
    assert_eq!(cfg.concurrency, 5);
    assert_eq!(cfg.default_timeout_ms, 250);
    assert_eq!(cfg.poll_interval_ms, 10);

    std::env::set_var(ENV_CONCURRENCY, "many");
    assert!(PoolConfig::from_env().is_err());

    std::env::set_var(ENV_CONCURRENCY, "0");
    assert!(PoolConfig::from_env().is_err());

    std::env::remove_var(ENV_CONCURRENCY);
    std::env::remove_var(ENV_DEFAULT_TIMEOUT_MS);
}
