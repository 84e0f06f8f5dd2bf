//! Automation steps

use serde::{Deserialize, Serialize};

use crate::model::binding::ParameterBinding;

/// One node of the step tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Bound device id; absent means the first device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Explicit Hybrid sub-backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(flatten)]
    pub kind: StepKind,
}

/// Explicit Hybrid routing tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Streaming,
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum StepKind {
    Connect,
    Disconnect,
    Write(CommandStep),
    Query(QueryStep),
    SetAndQuery(QueryStep),
    Sleep { seconds: f64 },
    Comment { text: String },
    PythonPassthrough { code: String },
    SaveWaveform(WaveformStep),
    SaveScreenshot(ScreenshotStep),
    ErrorCheck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    Recall(RecallStep),
    Group { children: Vec<Step> },
    DriverCall { code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "ParameterBinding::is_empty")]
    pub bindings: ParameterBinding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "ParameterBinding::is_empty")]
    pub bindings: ParameterBinding,
    /// Python variable receiving the reply; absent means print it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveformFormat {
    #[default]
    Binary,
    Csv,
    Wfm,
    Mat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformStep {
    #[serde(default = "default_source")]
    pub source: String,
    pub filename: String,
    #[serde(default)]
    pub format: WaveformFormat,
    /// Bytes per sample; absent means the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u8>,
    /// Absent means auto-detect at run time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_length: Option<u64>,
}

fn default_source() -> String {
    "CH1".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    #[default]
    Png,
    Bmp,
    Jpg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Jpg => "jpg",
        }
    }

    /// Mnemonic used by `EXPort:FORMat`
    pub fn scpi_name(self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Jpg => "JPEG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotStep {
    pub filename: String,
    #[serde(default)]
    pub image_format: ImageFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallKind {
    Factory,
    Setup,
    Session,
    Waveform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallStep {
    pub recall: RecallKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Reference slot for waveform recall, e.g. `REF1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            device: None,
            route: None,
            kind,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }

    pub fn children(&self) -> &[Step] {
        match &self.kind {
            StepKind::Group { children } => children,
            _ => &[],
        }
    }

    /// Label for messages: the label if set, else the id
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// Free text carried by the step, if any: command, code
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Write(c) => Some(&c.command),
            StepKind::Query(q) | StepKind::SetAndQuery(q) => Some(&q.command),
            StepKind::PythonPassthrough { code } | StepKind::DriverCall { code } => Some(code),
            _ => None,
        }
    }
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Connect => "connect",
            StepKind::Disconnect => "disconnect",
            StepKind::Write(_) => "write",
            StepKind::Query(_) => "query",
            StepKind::SetAndQuery(_) => "set_and_query",
            StepKind::Sleep { .. } => "sleep",
            StepKind::Comment { .. } => "comment",
            StepKind::PythonPassthrough { .. } => "python_passthrough",
            StepKind::SaveWaveform(_) => "save_waveform",
            StepKind::SaveScreenshot(_) => "save_screenshot",
            StepKind::ErrorCheck { .. } => "error_check",
            StepKind::Recall(_) => "recall",
            StepKind::Group { .. } => "group",
            StepKind::DriverCall { .. } => "driver_call",
        }
    }
}

/// Visit every step depth-first, parents before children
pub fn walk<'a>(steps: &'a [Step], visit: &mut impl FnMut(&'a Step)) {
    for step in steps {
        visit(step);
        walk(step.children(), visit);
    }
}
