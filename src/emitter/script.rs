//! Python script builder
//!
//! Collects indented lines, the imports they need and the diagnostics raised
//! while emitting them.

use std::collections::BTreeSet;
use std::fmt;

/// Python imports, ordered stdlib first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Import {
    Socket,
    Time,
    PyVisa,
    TekHsi,
    TmDataTypes,
    TmDevices,
}

impl Import {
    pub fn line(self) -> &'static str {
        match self {
            Import::Socket => "import socket",
            Import::Time => "import time",
            Import::PyVisa => "import pyvisa",
            Import::TekHsi => "from tekhsi import TekHSIConnect",
            Import::TmDataTypes => "from tm_data_types import write_file",
            Import::TmDevices => "from tm_devices import DeviceManager",
        }
    }

    fn is_stdlib(self) -> bool {
        matches!(self, Import::Socket | Import::Time)
    }
}

/// A non-fatal problem found while emitting a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub step_id: Option<String>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(id) => write!(f, "step '{}': {}", id, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptBuilder {
    indent_unit: String,
    depth: usize,
    lines: Vec<String>,
    imports: BTreeSet<Import>,
    drivers: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
    step: Option<String>,
}

impl ScriptBuilder {
    pub fn new(indent: usize) -> Self {
        Self {
            indent_unit: " ".repeat(indent),
            depth: 0,
            lines: Vec::new(),
            imports: BTreeSet::new(),
            drivers: BTreeSet::new(),
            diagnostics: Vec::new(),
            step: None,
        }
    }

    /// Append one line at the current depth
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines
                .push(format!("{}{}", self.indent_unit.repeat(self.depth), text));
        }
    }

    /// Append a blank line unless the previous line is already blank
    pub fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// `header:` followed by an indented body
    pub fn block(&mut self, header: impl AsRef<str>, body: impl FnOnce(&mut Self)) {
        self.line(header);
        self.indent();
        let before = self.lines.len();
        body(self);
        if self.lines.len() == before {
            self.line("pass");
        }
        self.dedent();
    }

    /// One `#` comment line per input line
    pub fn comment(&mut self, text: &str) {
        if text.trim().is_empty() {
            self.line("#");
            return;
        }
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                self.line("#");
            } else {
                self.line(format!("# {}", line));
            }
        }
    }

    /// User code, re-indented to the current depth
    pub fn verbatim(&mut self, code: &str) {
        let common = code
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.len() - l.trim_start().len())
            .min()
            .unwrap_or(0);
        for line in code.lines() {
            if line.trim().is_empty() {
                self.line("");
            } else {
                self.line(line.get(common..).unwrap_or(line.trim_start()).trim_end());
            }
        }
    }

    pub fn require(&mut self, import: Import) {
        self.imports.insert(import);
    }

    /// `from tm_devices.drivers import <model>`
    pub fn require_driver(&mut self, model: &str) {
        self.drivers.insert(model.to_string());
    }

    /// Mark the step subsequent diagnostics belong to
    pub fn set_step(&mut self, step_id: Option<&str>) {
        self.step = step_id.map(str::to_string);
    }

    /// Visible `# WARNING:` marker plus a recorded diagnostic
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.line(format!("# WARNING: {}", message));
        self.note(message);
    }

    /// Record a diagnostic without emitting anything
    pub fn note(&mut self, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            step_id: self.step.clone(),
            message: message.into(),
        };
        tracing::warn!(%diagnostic, "emission diagnostic");
        self.diagnostics.push(diagnostic);
    }

    /// Append another builder's lines at the current depth and merge its requirements
    pub fn append(&mut self, other: ScriptBuilder) {
        for line in other.lines {
            self.line(line);
        }
        self.imports.extend(other.imports);
        self.drivers.extend(other.drivers);
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Import block: stdlib group, then third-party group
    pub fn import_lines(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .imports
            .iter()
            .filter(|i| i.is_stdlib())
            .map(|i| i.line().to_string())
            .collect();
        let third_party: Vec<String> = self
            .imports
            .iter()
            .filter(|i| !i.is_stdlib())
            .map(|i| i.line().to_string())
            .chain(
                self.drivers
                    .iter()
                    .map(|m| format!("from tm_devices.drivers import {}", m)),
            )
            .collect();
        if !out.is_empty() && !third_party.is_empty() {
            out.push(String::new());
        }
        out.extend(third_party);
        out
    }

    /// Final text and diagnostics
    pub fn finish(self) -> (String, Vec<Diagnostic>) {
        let mut lines = self.lines;
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        let mut text = lines.join("\n");
        text.push('\n');
        (text, self.diagnostics)
    }
}

/// Python string literal
///
/// Prefers double quotes and switches to single quotes when the text itself
/// contains double quotes, so SCPI string arguments read naturally.
pub fn py_str(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\n', "\\n");
    if escaped.contains('"') && !escaped.contains('\'') {
        format!("'{}'", escaped)
    } else {
        format!("\"{}\"", escaped.replace('"', "\\\""))
    }
}

/// Python bytes literal
pub fn py_bytes(s: &str) -> String {
    format!("b{}", py_str(s))
}

/// Python float literal (`1.0`, `0.25`)
pub fn py_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
