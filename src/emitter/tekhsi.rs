//! Streaming backend: TekHSI waveform sessions
//!
//! TekHSI only moves waveform data. Steps that need a SCPI channel are kept
//! in the program as commented-out calls behind a visible warning.

use crate::emitter::{assign_or_print, emit_sleep, py_str, CommandText, Emitter, Import, Manager, ScriptBuilder, Target};
use crate::model::{Backend, RecallKind, Step, StepKind, WaveformFormat, WaveformStep};

#[derive(Debug, Clone, Copy, Default)]
pub struct TekHsiEmitter;

impl TekHsiEmitter {
    fn unsupported(&self, out: &mut ScriptBuilder, target: &Target<'_>, what: &str, call: &str) {
        out.warn(format!("{} needs a SCPI channel; streaming sessions have none", what));
        out.line(format!("# {}.write({})", target.handle, py_str(call)));
    }

    fn save_waveform(&self, out: &mut ScriptBuilder, target: &Target<'_>, step: &WaveformStep) {
        // write_file picks its format from the extension
        if step.format == WaveformFormat::Binary {
            out.warn(format!(
                "binary transfer of {} needs a SCPI channel; saving with write_file instead",
                step.source
            ));
        }
        if step.width.is_some() || step.record_length.is_some() {
            out.warn("streaming sessions ignore waveform width and record length");
        }
        out.require(Import::TmDataTypes);
        let fetch = format!(
            "waveform = {}.get_data({})",
            target.handle,
            py_str(&step.source.to_lowercase())
        );
        let store = format!("write_file({}, waveform)", py_str(&step.filename));
        if target.in_stream_context {
            out.line(fetch);
            out.line(store);
        } else {
            out.block(format!("with {}.access_data():", target.handle), |b| b.line(fetch));
            out.line(store);
        }
    }
}

impl Emitter for TekHsiEmitter {
    fn backend(&self) -> Backend {
        Backend::Streaming
    }

    fn manager(&self) -> Option<Manager> {
        None
    }

    fn open(&self, out: &mut ScriptBuilder, target: &Target<'_>) {
        out.require(Import::TekHsi);
        let address = format!(
            "{}:{}",
            target.device.connection.host, target.config.streaming.port
        );
        out.line(format!("{} = TekHSIConnect({})", target.handle, py_str(&address)));
    }

    fn close(&self, out: &mut ScriptBuilder, target: &Target<'_>) {
        out.line(format!("{}.close()", target.handle));
    }

    fn emit(
        &self,
        out: &mut ScriptBuilder,
        target: &Target<'_>,
        step: &Step,
        command: Option<&CommandText>,
    ) {
        match &step.kind {
            StepKind::Connect | StepKind::Disconnect | StepKind::Group { .. } => {}
            StepKind::Write(_) => match command {
                Some(CommandText::Expression(code)) => out.verbatim(code),
                Some(CommandText::Scpi(resolved)) => {
                    self.unsupported(out, target, "write", &resolved.write_form())
                }
                None => out.warn("write step has no command"),
            },
            StepKind::Query(q) => match command {
                Some(CommandText::Expression(code)) => {
                    assign_or_print(out, code, q.variable.as_deref())
                }
                Some(CommandText::Scpi(resolved)) => {
                    self.unsupported(out, target, "query", &resolved.query_form())
                }
                None => out.warn("query step has no command"),
            },
            StepKind::SetAndQuery(_) => match command {
                Some(CommandText::Expression(code)) => out.verbatim(code),
                Some(CommandText::Scpi(resolved)) => {
                    self.unsupported(out, target, "set-and-query", &resolved.write_form())
                }
                None => out.warn("set-and-query step has no command"),
            },
            StepKind::Sleep { seconds } => emit_sleep(out, *seconds),
            StepKind::Comment { text } => out.comment(text),
            StepKind::PythonPassthrough { code } | StepKind::DriverCall { code } => out.verbatim(code),
            StepKind::SaveWaveform(w) => self.save_waveform(out, target, w),
            StepKind::SaveScreenshot(s) => self.unsupported(
                out,
                target,
                "screenshot",
                &format!("SAVE:IMAGe \"{}\"", s.filename),
            ),
            StepKind::ErrorCheck { command } => self.unsupported(
                out,
                target,
                "error check",
                command.as_deref().unwrap_or("ALLEV?"),
            ),
            StepKind::Recall(r) => {
                let call = match (r.recall, r.filename.as_deref()) {
                    (RecallKind::Factory, _) => "*RST".to_string(),
                    (RecallKind::Setup, file) => format!("RECAll:SETUp \"{}\"", file.unwrap_or("")),
                    (RecallKind::Session, file) => {
                        format!("RECAll:SESsion \"{}\"", file.unwrap_or(""))
                    }
                    (RecallKind::Waveform, file) => format!(
                        "RECAll:WAVEform \"{}\",{}",
                        file.unwrap_or(""),
                        r.reference.as_deref().unwrap_or("REF1")
                    ),
                };
                self.unsupported(out, target, "recall", &call);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::model::{Connection, Device};
    use crate::template::Resolver;
    use pretty_assertions::assert_eq;

    fn scope() -> Device {
        Device::new("d1", "scope", Connection::tcpip("192.168.1.10"))
    }

    #[test]
    fn test_open_uses_streaming_port() {
        let config = GeneratorConfig::default();
        let device = scope();
        let target = Target::new(&device, &config, false);
        let mut out = ScriptBuilder::new(4);
        TekHsiEmitter.open(&mut out, &target);
        assert_eq!(out.import_lines(), vec!["from tekhsi import TekHSIConnect"]);
        assert_eq!(out.finish().0, "scope = TekHSIConnect(\"192.168.1.10:5000\")\n");
    }

    #[test]
    fn test_save_waveform_opens_its_own_context() {
        let config = GeneratorConfig::default();
        let device = scope();
        let target = Target::new(&device, &config, false);
        let step = Step::new(
            "w",
            StepKind::SaveWaveform(WaveformStep {
                source: "CH1".to_string(),
                filename: "capture.wfm".to_string(),
                format: WaveformFormat::Wfm,
                width: None,
                record_length: None,
            }),
        );
        let mut out = ScriptBuilder::new(4);
        TekHsiEmitter.emit(&mut out, &target, &step, None);
        assert_eq!(
            out.finish().0,
            r#"with scope.access_data():
    waveform = scope.get_data("ch1")
write_file("capture.wfm", waveform)
"#
        );
    }

    #[test]
    fn test_binary_format_is_flagged() {
        let config = GeneratorConfig::default();
        let device = scope();
        let target = Target::new(&device, &config, false);
        let step = Step::new(
            "w",
            StepKind::SaveWaveform(WaveformStep {
                source: "CH1".to_string(),
                filename: "cap.bin".to_string(),
                format: WaveformFormat::Binary,
                width: Some(2),
                record_length: None,
            }),
        );
        let mut out = ScriptBuilder::new(4);
        TekHsiEmitter.emit(&mut out, &target, &step, None);
        assert_eq!(out.diagnostics().len(), 2);
        let source = out.finish().0;
        assert!(source.starts_with(
            "# WARNING: binary transfer of CH1 needs a SCPI channel; saving with write_file instead\n"
        ));
        assert!(source.contains("write_file(\"cap.bin\", waveform)"));
    }

    #[test]
    fn test_scpi_write_is_a_visible_warning() {
        let config = GeneratorConfig::default();
        let device = scope();
        let target = Target::new(&device, &config, false);
        let bindings = Default::default();
        let resolved = Resolver::new(&[], &bindings)
            .resolve_command("ACQuire:STATE RUN")
            .expect("Should resolve");
        let step = Step::new(
            "s7",
            StepKind::Write(crate::model::CommandStep {
                command: "ACQuire:STATE RUN".to_string(),
                bindings: Default::default(),
            }),
        );
        let mut out = ScriptBuilder::new(4);
        out.set_step(Some("s7"));
        TekHsiEmitter.emit(&mut out, &target, &step, Some(&CommandText::Scpi(resolved)));
        assert_eq!(out.diagnostics().len(), 1);
        assert_eq!(
            out.finish().0,
            "# WARNING: write needs a SCPI channel; streaming sessions have none\n# scope.write(\"ACQuire:STATE RUN\")\n"
        );
    }
}
