//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use logon_gateway::config::{GatewayConfig, ServerConfig, TlsConfig, TransportConfig};
use logon_gateway::GatewayError;
use tracing::Level;

fn dev_config() -> GatewayConfig {
    GatewayConfig::default_with_overrides(|c| c.tls.self_signed = true)
}

#[test]
fn test_default_config_requires_tls_source() {
    let errors = GatewayConfig::default().validate();
    assert_eq!(errors.len(), 1, "unexpected errors: {errors:?}");
    assert!(errors[0].contains("No TLS certificate"));
}

#[test]
fn test_self_signed_config_validates() {
    let errors = dev_config().validate();
    assert!(errors.is_empty(), "expected valid config, got {errors:?}");
    assert!(dev_config().validate_strict().is_ok());
}

#[test]
fn test_defaults_match_documented_values() {
    let server = ServerConfig::default();
    assert_eq!(server.port, 1119);
    assert_eq!(server.bind_address, "0.0.0.0");
    assert_eq!(server.idle_timeout, Duration::from_secs(60));
    assert_eq!(server.handshake_timeout, Duration::from_secs(10));
    assert_eq!(server.linger, Duration::from_secs(2));
    assert_eq!(TransportConfig::default().max_payload_size, 1024 * 1024);
    assert_eq!(TlsConfig::default().min_version, "1.2");
}

#[test]
fn test_invalid_server_values() {
    let mut config = dev_config();
    config.server.bind_address = "not-an-ip".into();
    config.server.io_threads = 0;
    config.server.max_connections = 0;
    config.server.idle_timeout = Duration::from_millis(5);
    config.server.handshake_timeout = Duration::from_secs(600);

    let errors = config.validate();
    assert_eq!(errors.len(), 5, "unexpected errors: {errors:?}");
    assert!(errors.iter().any(|e| e.contains("Invalid bind address")));
    assert!(errors.iter().any(|e| e.contains("Idle timeout too short")));
    assert!(errors.iter().any(|e| e.contains("Handshake timeout too long")));
}

#[test]
fn test_invalid_tls_values() {
    let mut config = dev_config();
    config.tls.min_version = "1.1".into();
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Unsupported TLS minimum version")));

    let mut config = GatewayConfig::default();
    config.tls.cert_path = Some("/nonexistent/cert.pem".into());
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("must be set together")));
    assert!(errors.iter().any(|e| e.contains("does not exist")));
}

#[test]
fn test_payload_limits() {
    let mut config = dev_config();
    config.transport.max_payload_size = 512;
    assert!(!config.validate().is_empty());

    config.transport.max_payload_size = 32 * 1024 * 1024;
    assert!(!config.validate().is_empty());

    config.transport.max_payload_size = 64 * 1024;
    assert!(config.validate().is_empty());
}

#[test]
fn test_auth_section() {
    let mut config = dev_config();
    config.auth.max_in_flight = 0;
    config.auth.decoy_secret = Some("abcd".into());
    assert_eq!(config.validate().len(), 2);

    config.auth.max_in_flight = 4;
    config.auth.decoy_secret = Some("00112233445566778899aabbccddeeff".into());
    assert!(config.validate().is_empty());
    assert_eq!(config.auth.decoy_secret_bytes().map(|b| b.len()), Some(16));
}

#[test]
fn test_strict_validation_reports_all_errors() {
    let mut config = dev_config();
    config.server.io_threads = 0;
    config.transport.max_payload_size = 1;

    match config.validate_strict() {
        Err(GatewayError::ConfigError(message)) => {
            assert!(message.contains("I/O thread count"));
            assert!(message.contains("Max payload size too small"));
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_toml_parsing() {
    let config = GatewayConfig::from_toml(
        r#"
        [server]
        bind_address = "127.0.0.1"
        port = 3724
        idle_timeout = 30000

        [tls]
        self_signed = true
        min_version = "1.3"

        [auth]
        max_in_flight = 16

        [logging]
        log_level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.server.port, 3724);
    assert_eq!(config.server.idle_timeout, Duration::from_secs(30));
    assert_eq!(config.server.handshake_timeout, Duration::from_secs(10));
    assert_eq!(config.tls.min_version, "1.3");
    assert_eq!(config.auth.max_in_flight, 16);
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.validate().is_empty());
}

#[test]
fn test_malformed_toml_is_config_error() {
    assert!(matches!(
        GatewayConfig::from_toml("[server\nport = "),
        Err(GatewayError::ConfigError(_))
    ));
    assert!(matches!(
        GatewayConfig::from_toml("[logging]\nlog_level = \"loud\""),
        Err(GatewayError::ConfigError(_))
    ));
}

#[test]
fn test_example_config_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.toml");

    let original = dev_config();
    original.save_to_file(&path).unwrap();
    let loaded = GatewayConfig::from_file(&path).unwrap();
    assert_eq!(loaded.server.port, original.server.port);
    assert!(loaded.tls.self_signed);

    assert!(GatewayConfig::from_toml(&GatewayConfig::example_config()).is_ok());
}

#[test]
fn test_env_overrides() {
    std::env::set_var("LOGON_GATEWAY_PORT", "4000");
    std::env::set_var("LOGON_GATEWAY_IDLE_TIMEOUT_MS", "1500");
    let config = GatewayConfig::from_env().unwrap();
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.server.idle_timeout, Duration::from_millis(1500));

    std::env::set_var("LOGON_GATEWAY_PORT", "not-a-port");
    assert!(matches!(
        GatewayConfig::from_env(),
        Err(GatewayError::ConfigError(_))
    ));

    std::env::remove_var("LOGON_GATEWAY_PORT");
    std::env::remove_var("LOGON_GATEWAY_IDLE_TIMEOUT_MS");
}
