//! DirectRaw backend: PyVISA resource sessions

use crate::emitter::scpi::{Scpi, PYVISA};
use crate::emitter::{emit_sleep, py_str, CommandText, Emitter, Manager, ScriptBuilder, Target};
use crate::model::{Backend, Step, StepKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct PyVisaEmitter;

impl Emitter for PyVisaEmitter {
    fn backend(&self) -> Backend {
        Backend::DirectRaw
    }

    fn manager(&self) -> Option<Manager> {
        Some(Manager::Visa)
    }

    fn open(&self, out: &mut ScriptBuilder, target: &Target<'_>) {
        let connection = &target.device.connection;
        let resource = connection.visa_resource(target.config.visa.socket_port);
        let handle = &target.handle;
        out.line(format!("{} = rm.open_resource({})", handle, py_str(&resource)));
        out.line(format!("{}.timeout = {}", handle, target.config.visa.timeout_ms));
        if connection.is_socket() {
            out.line(format!("{}.read_termination = \"\\n\"", handle));
            out.line(format!("{}.write_termination = \"\\n\"", handle));
        }
        if target.config.python.identify_on_connect {
            out.line(format!("print({}.query(\"*IDN?\").strip())", handle));
        }
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
        let scpi = Scpi::new(target, PYVISA);
        match &step.kind {
            StepKind::Connect | StepKind::Disconnect | StepKind::Group { .. } => {}
            StepKind::Write(_) => scpi.write_command(out, command),
            StepKind::Query(q) => scpi.query_command(out, command, q.variable.as_deref()),
            StepKind::SetAndQuery(q) => scpi.set_and_query(out, command, q.variable.as_deref()),
            StepKind::Sleep { seconds } => emit_sleep(out, *seconds),
            StepKind::Comment { text } => out.comment(text),
            StepKind::PythonPassthrough { code } | StepKind::DriverCall { code } => out.verbatim(code),
            StepKind::SaveWaveform(w) => scpi.save_waveform(out, w),
            StepKind::SaveScreenshot(s) => scpi.save_screenshot(out, s),
            StepKind::ErrorCheck { command } => scpi.error_check(out, command.as_deref()),
            StepKind::Recall(r) => scpi.recall(out, r),
        }
    }
}
