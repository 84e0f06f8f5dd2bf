//! Generator configuration
//!
//! Settings that shape the emitted program rather than its semantics. Loaded
//! from TOML; every section and key is optional:
//!
//! ```toml
//! [python]
//! indent = 4
//!
//! [visa]
//! timeout_ms = 10000
//!
//! [transfer]
//! remote_temp_dir = "D:/Temp"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading or writing configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub python: PythonConfig,
    pub visa: VisaConfig,
    pub streaming: StreamingConfig,
    pub transfer: TransferConfig,
    pub waveform: WaveformConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Spaces per indentation level
    pub indent: usize,
    /// Emit the shebang and docstring banner
    pub banner: bool,
    /// Print `*IDN?` right after each connection opens
    pub identify_on_connect: bool,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            indent: 4,
            banner: true,
            identify_on_connect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisaConfig {
    pub timeout_ms: u64,
    /// Port for socket connections that do not declare one
    pub socket_port: u16,
}

impl Default for VisaConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            socket_port: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// TekHSI gRPC port
    pub port: u16,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Receive size for the raw-socket screenshot helper
    pub chunk_size: usize,
    /// Seconds of silence that end a raw-socket transfer
    pub socket_timeout_s: f64,
    /// Instrument-side scratch directory on modern instruments
    pub remote_temp_dir: String,
    /// Instrument-side scratch directory on legacy instruments
    pub legacy_temp_dir: String,
    /// File stem for instrument-side scratch files
    pub temp_stem: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 65536,
            socket_timeout_s: 5.0,
            remote_temp_dir: "C:/Temp".to_string(),
            legacy_temp_dir: "C:/TekScope".to_string(),
            temp_stem: "stepforge_temp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    pub encoding: String,
    /// Bytes per sample for binary captures
    pub binary_width: u8,
    /// Bytes per sample for CSV captures
    pub csv_width: u8,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            encoding: "RIBinary".to_string(),
            binary_width: 1,
            csv_width: 2,
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.python.indent = indent;
        self
    }

    pub fn with_banner(mut self, banner: bool) -> Self {
        self.python.banner = banner;
        self
    }

    pub fn with_identify_on_connect(mut self, identify: bool) -> Self {
        self.python.identify_on_connect = identify;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.visa.timeout_ms = timeout_ms;
        self
    }

    pub fn with_streaming_port(mut self, port: u16) -> Self {
        self.streaming.port = port;
        self
    }

    pub fn with_remote_temp_dir(mut self, dir: impl Into<String>) -> Self {
        self.transfer.remote_temp_dir = dir.into();
        self
    }
}
