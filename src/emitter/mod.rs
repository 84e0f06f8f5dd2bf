//! Backend emitters
//!
//! Each backend turns a step into Python lines appended to a
//! [`ScriptBuilder`]. Connection handling (`open`/`close`) is part of the
//! same contract so the assembler can pair every open with one close.

pub mod hybrid;
pub mod pyvisa;
pub mod scpi;
pub mod script;
pub mod tekhsi;
pub mod tm_devices;

use once_cell::sync::Lazy;
use regex::RegexSet;

use crate::config::GeneratorConfig;
use crate::model::{Backend, Device, Generation, Step};
use crate::template::ResolvedCommand;

pub use hybrid::{HybridEmitter, HybridRouter, Side};
pub use pyvisa::PyVisaEmitter;
pub use script::{py_bytes, py_float, py_str, Diagnostic, Import, ScriptBuilder};
pub use tekhsi::TekHsiEmitter;
pub use tm_devices::TmDevicesEmitter;

/// Command payload handed to an emitter for write/query steps
#[derive(Debug, Clone, PartialEq)]
pub enum CommandText {
    /// Resolved SCPI command
    Scpi(ResolvedCommand),
    /// Text that already is a Python API call; emitted as-is
    Expression(String),
}

/// Shared session objects created once per program
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Manager {
    Visa,
    Devices,
}

impl Manager {
    pub fn setup(self, out: &mut ScriptBuilder) {
        match self {
            Manager::Visa => {
                out.require(Import::PyVisa);
                out.line("rm = pyvisa.ResourceManager()");
            }
            Manager::Devices => {
                out.require(Import::TmDevices);
                out.line("dm = DeviceManager(verbose=False)");
            }
        }
    }

    pub fn teardown(self, out: &mut ScriptBuilder) {
        match self {
            Manager::Visa => out.line("rm.close()"),
            Manager::Devices => out.line("dm.close()"),
        }
    }
}

/// Where an emitted line is aimed: the device, its handle expression and config
#[derive(Debug, Clone)]
pub struct Target<'a> {
    pub device: &'a Device,
    pub config: &'a GeneratorConfig,
    /// `scope` or `devices["scope"]`
    pub handle: String,
    /// Emitting inside an open `access_data()` block
    pub in_stream_context: bool,
    multi: bool,
}

impl<'a> Target<'a> {
    pub fn new(device: &'a Device, config: &'a GeneratorConfig, multi: bool) -> Self {
        let handle = handle_expression(&device.alias, multi);
        Self {
            device,
            config,
            handle,
            in_stream_context: false,
            multi,
        }
    }

    /// Target for the streaming handle of a Hybrid device (`<alias>_hsi`)
    pub fn streaming(&self) -> Self {
        Self {
            handle: handle_expression(&format!("{}_hsi", self.device.alias), self.multi),
            ..self.clone()
        }
    }

    /// Same target, inside an `access_data()` block
    pub fn in_stream(&self) -> Self {
        Self {
            in_stream_context: true,
            ..self.clone()
        }
    }

    /// Whether handles live in a `devices` dictionary
    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// Instrument-side scratch directory for this device's generation
    pub fn temp_dir(&self) -> &str {
        match self.device.generation() {
            Generation::Modern => &self.config.transfer.remote_temp_dir,
            Generation::Legacy => &self.config.transfer.legacy_temp_dir,
        }
    }

    /// Instrument-side scratch file with the given extension
    pub fn temp_file(&self, extension: &str) -> String {
        format!(
            "{}/{}.{}",
            self.temp_dir().trim_end_matches('/'),
            self.config.transfer.temp_stem,
            extension
        )
    }
}

/// Multi-device programs key the dictionary by the raw alias
fn handle_expression(alias: &str, multi: bool) -> String {
    if multi {
        format!("devices[{}]", py_str(alias))
    } else {
        crate::model::device::python_identifier(alias)
    }
}

/// Per-backend code generation
pub trait Emitter {
    fn backend(&self) -> Backend;

    /// Shared session object this backend needs, if any
    fn manager(&self) -> Option<Manager>;

    fn open(&self, out: &mut ScriptBuilder, target: &Target<'_>);

    fn close(&self, out: &mut ScriptBuilder, target: &Target<'_>);

    /// Emit one non-group step; `command` is set for write/query kinds
    fn emit(
        &self,
        out: &mut ScriptBuilder,
        target: &Target<'_>,
        step: &Step,
        command: Option<&CommandText>,
    );
}

/// Emitter for a device's effective backend
pub fn emitter_for(device: &Device, backend: Backend) -> Box<dyn Emitter> {
    match backend {
        Backend::DirectRaw => Box::new(PyVisaEmitter),
        Backend::HighLevelDriver => Box::new(TmDevicesEmitter),
        Backend::Streaming => Box::new(TekHsiEmitter),
        Backend::Hybrid => Box::new(HybridEmitter::for_device(device)),
    }
}

static API_CALL_MARKERS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"\.commands\.",
        r"\.write\(",
        r"\.query\(",
        r"\bdm\.",
        r"\.save_screenshot\(",
    ])
    .expect("valid regex set")
});

static STREAMING_MARKERS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"\.get_data\(",
        r"\.access_data\(",
        r"\bactive_symbols\b",
        r"\bTekHSIConnect\b",
        r"\bsource_names\b",
        r"\bwait_for_data\b",
    ])
    .expect("valid regex set")
});

/// Text that targets the streaming API
pub fn is_streaming_call(text: &str) -> bool {
    STREAMING_MARKERS.is_match(text)
}

/// Text that already is a Python API call rather than SCPI
pub fn is_api_call(text: &str) -> bool {
    API_CALL_MARKERS.is_match(text) || is_streaming_call(text)
}

/// `time.sleep(...)`
pub(crate) fn emit_sleep(out: &mut ScriptBuilder, seconds: f64) {
    out.require(Import::Time);
    out.line(format!("time.sleep({})", py_float(seconds.max(0.0))));
}

/// `var = expr` or `print(expr)`
pub(crate) fn assign_or_print(out: &mut ScriptBuilder, expression: &str, variable: Option<&str>) {
    match variable {
        Some(var) => out.line(format!(
            "{} = {}",
            crate::model::device::python_identifier(var),
            expression.trim()
        )),
        None => out.line(format!("print({})", expression.trim())),
    }
}
