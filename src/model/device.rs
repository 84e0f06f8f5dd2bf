//! Instrument endpoints and backends

use std::fmt;

use serde::{Deserialize, Serialize};

/// Communication strategy of one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// PyVISA resource session
    #[default]
    #[serde(alias = "pyvisa")]
    DirectRaw,
    /// tm_devices DeviceManager and typed drivers
    #[serde(alias = "tm_devices")]
    HighLevelDriver,
    /// TekHSI gRPC waveform streaming
    #[serde(alias = "tekhsi")]
    Streaming,
    /// Command channel plus a streaming channel on one instrument
    Hybrid,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::DirectRaw => "direct_raw",
            Backend::HighLevelDriver => "high_level_driver",
            Backend::Streaming => "streaming",
            Backend::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    #[default]
    Tcpip,
    Socket,
    Usb,
    Gpib,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub kind: ConnectionKind,
    /// IP address or host name; the board address for GPIB
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Explicit VISA resource string, used verbatim when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Connection {
    pub fn tcpip(host: impl Into<String>) -> Self {
        Self {
            kind: ConnectionKind::Tcpip,
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn socket(host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: ConnectionKind::Socket,
            host: host.into(),
            port: Some(port),
            resource: None,
        }
    }

    /// VISA resource string for this connection
    pub fn visa_resource(&self, default_socket_port: u16) -> String {
        if let Some(resource) = &self.resource {
            return resource.clone();
        }
        match self.kind {
            ConnectionKind::Tcpip => format!("TCPIP0::{}::inst0::INSTR", self.host),
            ConnectionKind::Socket => format!(
                "TCPIP0::{}::{}::SOCKET",
                self.host,
                self.port.unwrap_or(default_socket_port)
            ),
            ConnectionKind::Gpib => format!("GPIB0::{}::INSTR", self.host),
            ConnectionKind::Usb => self.host.clone(),
        }
    }

    pub fn is_socket(&self) -> bool {
        self.kind == ConnectionKind::Socket
    }
}

/// tm_devices driver hint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverHint {
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// Driver class such as `MSO6B`, used for type annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_device_type() -> String {
    "scope".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    #[default]
    Modern,
    Legacy,
}

/// Command side of a Hybrid device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridBase {
    #[default]
    Raw,
    Driver,
}

/// Model prefixes of instruments that only speak the legacy command set
const LEGACY_MODEL_PREFIXES: &[&str] = &["MSO7", "DPO7", "DPO5"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    /// Handle name in the generated program
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(default)]
    pub connection: Connection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_base: Option<HybridBase>,
}

impl Device {
    pub fn new(id: impl Into<String>, alias: impl Into<String>, connection: Connection) -> Self {
        Self {
            id: id.into(),
            alias: alias.into(),
            backend: None,
            connection,
            driver: None,
            generation: None,
            hybrid_base: None,
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_driver(mut self, device_type: impl Into<String>, model: Option<&str>) -> Self {
        self.driver = Some(DriverHint {
            device_type: device_type.into(),
            model: model.map(str::to_string),
        });
        self
    }

    pub fn with_hybrid_base(mut self, base: HybridBase) -> Self {
        self.hybrid_base = Some(base);
        self
    }

    /// Device backend, falling back to the program-wide default
    pub fn backend_or(&self, default: Backend) -> Backend {
        self.backend.unwrap_or(default)
    }

    /// Declared generation, else inferred from the driver model
    pub fn generation(&self) -> Generation {
        if let Some(generation) = self.generation {
            return generation;
        }
        let model = self
            .driver
            .as_ref()
            .and_then(|d| d.model.as_deref())
            .map(str::to_ascii_uppercase);
        match model {
            Some(m) if LEGACY_MODEL_PREFIXES.iter().any(|p| m.starts_with(p)) => Generation::Legacy,
            _ => Generation::Modern,
        }
    }

    pub fn hybrid_base(&self) -> HybridBase {
        self.hybrid_base.unwrap_or_default()
    }

    pub fn device_type(&self) -> &str {
        self.driver
            .as_ref()
            .map(|d| d.device_type.as_str())
            .unwrap_or("scope")
    }

    pub fn driver_model(&self) -> Option<&str> {
        self.driver.as_ref().and_then(|d| d.model.as_deref())
    }
}

/// Turn arbitrary text into a valid Python identifier
pub fn python_identifier(name: &str) -> String {
    let mut ident: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() {
        return "device".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}
