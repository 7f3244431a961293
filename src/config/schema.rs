//! Configuration schema definitions.
//!
//! Every section has serde defaults, so a settings file only needs the keys
//! it wants to change.

use crate::port::{DataBits, Parity, PortConfig, StopBits};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device and line settings
    pub serial: SerialConfig,
    /// Transport tuning
    pub transport: TransportConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device to open, or an alias for one
    pub device: Option<String>,
    pub baud_rate: u32,
    pub byte_size: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Inter-byte read timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// XON/XOFF software flow control
    pub xonxoff: bool,
    /// RTS/CTS hardware flow control
    pub rtscts: bool,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = PortConfig::default();
        Self {
            device: None,
            baud_rate: port.baud_rate,
            byte_size: port.byte_size,
            parity: port.parity,
            stop_bits: port.stop_bits,
            timeout_ms: None,
            xonxoff: port.soft_flow_control,
            rtscts: port.hard_flow_control,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    /// Line settings as handed to a transport.
    pub fn port_config(&self) -> PortConfig {
        PortConfig {
            baud_rate: self.baud_rate,
            byte_size: self.byte_size,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout: self.timeout_ms.map(Duration::from_millis),
            soft_flow_control: self.xonxoff,
            hard_flow_control: self.rtscts,
        }
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The configured device with aliases applied.
    pub fn resolved_device(&self) -> Option<String> {
        self.device.as_deref().map(|name| self.resolve_port(name))
    }
}

/// Transport tuning section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bytes per read; unset uses the transport's own default
    pub read_buffer_size: Option<usize>,
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}
