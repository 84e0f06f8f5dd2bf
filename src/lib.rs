//! stepforge - compile instrument automation step trees into Python
//!
//! This library turns a tree of automation steps plus SCPI command templates
//! into a runnable Python program for one of four backends: raw PyVISA
//! sessions, tm_devices drivers, TekHSI streaming, or a hybrid of a command
//! session and a streaming session.
//!
//! # Example
//!
//! ```rust
//! use stepforge::model::{Backend, CommandStep, Connection, Device, Step, StepKind};
//! use stepforge::assemble;
//!
//! let devices = vec![Device::new("d1", "scope", Connection::tcpip("192.168.1.10"))];
//! let steps = vec![Step::new(
//!     "1",
//!     StepKind::Write(CommandStep {
//!         command: "*RST".to_string(),
//!         bindings: Default::default(),
//!     }),
//! )];
//!
//! let source = assemble(&steps, &devices, Backend::DirectRaw).unwrap();
//! assert!(source.contains("scope.write(\"*RST\")"));
//! ```

pub mod assembler;
pub mod catalog;
pub mod config;
pub mod emitter;
pub mod error;
pub mod model;
pub mod template;

pub use assembler::{assemble, Assembler, BoundStep, CompiledScript};
pub use catalog::{Catalog, CatalogEntry, CatalogError, CommandParam, ParamType};
pub use config::{ConfigError, GeneratorConfig};
pub use emitter::Diagnostic;
pub use error::TemplateError;
pub use model::{Backend, Device, ParameterBinding, Project, Step, StepKind};
pub use template::{canonicalize, resolve};

use thiserror::Error;

/// Errors that stop compilation
#[derive(Debug, Error)]
pub enum CompileError {
    /// A command template in a step is malformed
    #[error("step '{step_id}' ({label}): {source}")]
    Template {
        step_id: String,
        label: String,
        template: String,
        #[source]
        source: TemplateError,
    },

    /// There is no device to bind steps to
    #[error("no devices declared")]
    NoDevices,

    #[error("invalid project JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Human-readable report, with the template annotated for template errors
    pub fn report(&self) -> String {
        match self {
            CompileError::Template {
                step_id,
                label,
                template,
                source,
            } => {
                let name = format!("step {} ({})", step_id, label);
                source.format(template, &name)
            }
            other => other.to_string(),
        }
    }
}

/// Compile a project with the given catalog and configuration
pub fn compile(
    project: &Project,
    catalog: &Catalog,
    config: &GeneratorConfig,
) -> Result<CompiledScript, CompileError> {
    Assembler::new(catalog, config).assemble_with_diagnostics(
        &project.steps,
        &project.devices,
        project.backend,
    )
}
