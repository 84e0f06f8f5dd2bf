//! HighLevelDriver backend: tm_devices DeviceManager and typed drivers

use crate::emitter::scpi::{Scpi, TM_DEVICES};
use crate::emitter::{emit_sleep, py_str, CommandText, Emitter, Manager, ScriptBuilder, Target};
use crate::model::{Backend, ConnectionKind, Generation, Step, StepKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct TmDevicesEmitter;

/// Arguments for `dm.add_<device_type>(...)`
fn add_arguments(target: &Target<'_>) -> String {
    let connection = &target.device.connection;
    let alias = py_str(&target.device.alias);
    match (&connection.resource, connection.kind) {
        (Some(resource), _) => format!("{}, alias={}", py_str(resource), alias),
        (None, ConnectionKind::Tcpip) => format!("{}, alias={}", py_str(&connection.host), alias),
        (None, ConnectionKind::Socket) => format!(
            "{}, alias={}, connection_type=\"SOCKET\", port={}",
            py_str(&connection.host),
            alias,
            connection.port.unwrap_or(target.config.visa.socket_port)
        ),
        (None, ConnectionKind::Usb) => format!(
            "{}, alias={}, connection_type=\"USB\"",
            py_str(&connection.host),
            alias
        ),
        (None, ConnectionKind::Gpib) => format!(
            "{}, alias={}, connection_type=\"GPIB\"",
            py_str(&connection.host),
            alias
        ),
    }
}

impl Emitter for TmDevicesEmitter {
    fn backend(&self) -> Backend {
        Backend::HighLevelDriver
    }

    fn manager(&self) -> Option<Manager> {
        Some(Manager::Devices)
    }

    fn open(&self, out: &mut ScriptBuilder, target: &Target<'_>) {
        let call = format!(
            "dm.add_{}({})",
            target.device.device_type(),
            add_arguments(target)
        );
        match target.device.driver_model() {
            Some(model) if !target.is_multi() => {
                out.require_driver(model);
                out.line(format!("{}: {} = {}", target.handle, model, call));
            }
            _ => out.line(format!("{} = {}", target.handle, call)),
        }
        if target.config.python.identify_on_connect {
            out.line(format!("print({}.query(\"*IDN?\"))", target.handle));
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
        let scpi = Scpi::new(target, TM_DEVICES);
        match &step.kind {
            StepKind::Connect | StepKind::Disconnect | StepKind::Group { .. } => {}
            StepKind::Write(_) => scpi.write_command(out, command),
            StepKind::Query(q) => scpi.query_command(out, command, q.variable.as_deref()),
            StepKind::SetAndQuery(q) => scpi.set_and_query(out, command, q.variable.as_deref()),
            StepKind::Sleep { seconds } => emit_sleep(out, *seconds),
            StepKind::Comment { text } => out.comment(text),
            StepKind::PythonPassthrough { code } | StepKind::DriverCall { code } => out.verbatim(code),
            StepKind::SaveWaveform(w) => scpi.save_waveform(out, w),
            StepKind::SaveScreenshot(s) => {
                let modern = target.device.generation() == Generation::Modern;
                if modern && !target.device.connection.is_socket() {
                    out.line(format!(
                        "{}.save_screenshot({})",
                        target.handle,
                        py_str(&s.filename)
                    ));
                } else {
                    scpi.save_screenshot(out, s);
                }
            }
            StepKind::ErrorCheck { command } => scpi.error_check(out, command.as_deref()),
            StepKind::Recall(r) => scpi.recall(out, r),
        }
    }
}
