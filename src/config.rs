//! Configuration for linkwire
//!
//! Centralized configuration with sensible defaults. Server and client each
//! own one `Config`; address and port are locked while started/connected,
//! the remaining knobs are read when the session starts.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::codec::TextCodec;
use crate::error::{Result, WireError};

/// Default maximum bytes per receive (`i16::MAX`)
pub const DEFAULT_PACKET_SIZE: usize = 32767;

/// Default liveness poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default send timeout in milliseconds
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;

/// Session configuration shared by server and client
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Endpoint Configuration
    // -------------------------------------------------------------------------
    /// Listen IP (server) or host name / IP (client)
    pub address: Option<String>,

    /// Listen port (server, `0` = OS assigned) or remote port (client)
    pub port: Option<u16>,

    // -------------------------------------------------------------------------
    // Receive Configuration
    // -------------------------------------------------------------------------
    /// Max bytes requested per receive operation. Not a framing boundary.
    pub packet_size: usize,

    /// Codec for the text view of each received payload
    pub codec: TextCodec,

    /// Strip zero padding from the end of each received buffer
    pub trim_trailing_zeros: bool,

    /// How received data is pulled off the sockets (server only)
    pub read_mode: ReadMode,

    // -------------------------------------------------------------------------
    // Liveness Configuration
    // -------------------------------------------------------------------------
    /// Pause between liveness scans (milliseconds, 0 = scan continuously)
    pub poll_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Socket Configuration
    // -------------------------------------------------------------------------
    /// Disable Nagle's algorithm on every established socket
    pub tcp_nodelay: bool,

    /// Send timeout (milliseconds, 0 = block indefinitely)
    pub write_timeout_ms: u64,
}

/// Reader operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadMode {
    /// One blocking reader thread per connection
    #[default]
    PerConnection,

    /// One shared thread polling every connection for readiness
    Multiplexed,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: None,
            port: None,
            packet_size: DEFAULT_PACKET_SIZE,
            codec: TextCodec::Utf8,
            trim_trailing_zeros: true,
            read_mode: ReadMode::PerConnection,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            tcp_nodelay: true,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse a config from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| WireError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check knob values that would make a session unusable
    pub fn validate(&self) -> Result<()> {
        if self.packet_size == 0 {
            return Err(WireError::Config(
                "packet_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Liveness poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Send timeout, `None` when disabled
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the listen / remote address
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = Some(address.into());
        self
    }

    /// Set the listen / remote port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Set the maximum bytes per receive
    pub fn packet_size(mut self, size: usize) -> Self {
        self.config.packet_size = size;
        self
    }

    /// Set the text codec
    pub fn codec(mut self, codec: TextCodec) -> Self {
        self.config.codec = codec;
        self
    }

    /// Enable or disable trailing zero trimming
    pub fn trim_trailing_zeros(mut self, enabled: bool) -> Self {
        self.config.trim_trailing_zeros = enabled;
        self
    }

    /// Set the reader mode
    pub fn read_mode(mut self, mode: ReadMode) -> Self {
        self.config.read_mode = mode;
        self
    }

    /// Set the liveness poll interval (in milliseconds)
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.config.tcp_nodelay = enabled;
        self
    }

    /// Set the send timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
