//! Config Tests
//!
//! Tests verify:
//! - Defaults
//! - Builder setters
//! - TOML loading and validation

use std::io::Write;

use linkwire::config::{Config, ReadMode, DEFAULT_PACKET_SIZE, DEFAULT_WRITE_TIMEOUT_MS};
use linkwire::{TextCodec, WireError};
use tempfile::NamedTempFile;

// =============================================================================
// Defaults / Builder Tests
// =============================================================================

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.address, None);
    assert_eq!(config.port, None);
    assert_eq!(config.packet_size, DEFAULT_PACKET_SIZE);
    assert_eq!(config.codec, TextCodec::Utf8);
    assert!(config.trim_trailing_zeros);
    assert_eq!(config.read_mode, ReadMode::PerConnection);
    assert_eq!(config.poll_interval_ms, 100);
    assert!(config.tcp_nodelay);
    assert_eq!(
        config.write_timeout().map(|d| d.as_millis() as u64),
        Some(DEFAULT_WRITE_TIMEOUT_MS)
    );
}

#[test]
fn test_zero_write_timeout_disables_it() {
    let config = Config::builder().write_timeout_ms(0).build();
    assert_eq!(config.write_timeout(), None);
}

#[test]
fn test_builder_sets_every_field() {
    let config = Config::builder()
        .address("10.0.0.1")
        .port(4000)
        .packet_size(512)
        .codec(TextCodec::Latin1)
        .trim_trailing_zeros(false)
        .read_mode(ReadMode::Multiplexed)
        .poll_interval_ms(0)
        .tcp_nodelay(false)
        .write_timeout_ms(250)
        .build();

    assert_eq!(config.address.as_deref(), Some("10.0.0.1"));
    assert_eq!(config.port, Some(4000));
    assert_eq!(config.packet_size, 512);
    assert_eq!(config.codec, TextCodec::Latin1);
    assert!(!config.trim_trailing_zeros);
    assert_eq!(config.read_mode, ReadMode::Multiplexed);
    assert!(config.poll_interval().is_zero());
    assert!(!config.tcp_nodelay);
    assert_eq!(config.write_timeout().map(|d| d.as_millis()), Some(250));
}

#[test]
fn test_zero_packet_size_is_rejected() {
    let config = Config::builder().packet_size(0).build();
    assert!(matches!(config.validate(), Err(WireError::Config(_))));
}

// =============================================================================
// TOML Tests
// =============================================================================

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = Config::from_toml_str(
        r#"
        address = "0.0.0.0"
        port = 9000
        read_mode = "multiplexed"
        codec = "ascii"
        "#,
    )
    .unwrap();

    assert_eq!(config.address.as_deref(), Some("0.0.0.0"));
    assert_eq!(config.port, Some(9000));
    assert_eq!(config.read_mode, ReadMode::Multiplexed);
    assert_eq!(config.codec, TextCodec::Ascii);
    assert_eq!(config.packet_size, DEFAULT_PACKET_SIZE);
    assert!(config.trim_trailing_zeros);
}

#[test]
fn test_toml_with_unknown_codec_fails() {
    let result = Config::from_toml_str(r#"codec = "ebcdic""#);
    assert!(matches!(result, Err(WireError::Config(_))));
}

#[test]
fn test_toml_with_zero_packet_size_fails() {
    let result = Config::from_toml_str("packet_size = 0");
    assert!(matches!(result, Err(WireError::Config(_))));
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "port = 7000").unwrap();
    writeln!(file, "poll_interval_ms = 25").unwrap();
    writeln!(file, "trim_trailing_zeros = false").unwrap();
    file.flush().unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.port, Some(7000));
    assert_eq!(config.poll_interval_ms, 25);
    assert!(!config.trim_trailing_zeros);
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(WireError::Io(_))));
}
