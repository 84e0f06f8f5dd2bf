//! Step tree, devices and projects
//!
//! Steps and devices arrive as immutable JSON snapshots and are never
//! mutated by compilation.

pub mod binding;
pub mod device;
pub mod step;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use binding::{normalize_key, Companion, ParameterBinding};
pub use device::{Backend, Connection, ConnectionKind, Device, DriverHint, Generation, HybridBase};
pub use step::{
    walk, CommandStep, ImageFormat, QueryStep, RecallKind, RecallStep, Route, ScreenshotStep,
    Step, StepKind, WaveformFormat, WaveformStep,
};

/// Parse a JSON array of steps
pub fn parse_steps(json: &str) -> Result<Vec<Step>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Serialize steps back to their JSON interchange form
pub fn steps_to_json(steps: &[Step]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(steps)
}

/// A complete compilation input: default backend, devices and steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Project {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read a project JSON file
    pub fn from_file(path: &Path) -> Result<Self, crate::CompileError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}
