//! SCPI transfer protocols shared by the PyVISA and tm_devices emitters

use crate::emitter::{assign_or_print, py_bytes, py_float, py_str, CommandText, Import, ScriptBuilder, Target};
use crate::model::{Generation, ImageFormat, RecallKind, RecallStep, ScreenshotStep, WaveformFormat, WaveformStep};

/// How a SCPI-capable backend spells its calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Attribute path from the handle to the raw VISA session
    pub raw_session: &'static str,
    /// Query replies carry a trailing newline that needs `.strip()`
    pub strip_replies: bool,
}

pub const PYVISA: Dialect = Dialect {
    raw_session: "",
    strip_replies: true,
};

pub const TM_DEVICES: Dialect = Dialect {
    raw_session: ".visa_resource",
    strip_replies: false,
};

/// Scaling constants read before converting raw CSV samples
const SCALING_QUERIES: &[(&str, &str)] = &[
    ("x_incr", "WFMOutpre:XINcr?"),
    ("y_mult", "WFMOutpre:YMUlt?"),
    ("y_off", "WFMOutpre:YOFf?"),
    ("y_zero", "WFMOutpre:YZEro?"),
];

/// SCPI emission for one target
pub struct Scpi<'t, 'a> {
    target: &'t Target<'a>,
    dialect: Dialect,
}

impl<'t, 'a> Scpi<'t, 'a> {
    pub fn new(target: &'t Target<'a>, dialect: Dialect) -> Self {
        Self { target, dialect }
    }

    fn handle(&self) -> &str {
        &self.target.handle
    }

    fn raw(&self) -> String {
        format!("{}{}", self.target.handle, self.dialect.raw_session)
    }

    pub fn write(&self, out: &mut ScriptBuilder, command: &str) {
        out.line(format!("{}.write({})", self.handle(), py_str(command)));
    }

    /// Write with an f-string so `{name}` refers to a Python variable
    fn write_formatted(&self, out: &mut ScriptBuilder, command: &str) {
        out.line(format!("{}.write(f{})", self.handle(), py_str(command)));
    }

    /// Python expression that queries and returns the reply text
    pub fn query_expr(&self, command: &str) -> String {
        if self.dialect.strip_replies {
            format!("{}.query({}).strip()", self.handle(), py_str(command))
        } else {
            format!("{}.query({})", self.handle(), py_str(command))
        }
    }

    pub fn query(&self, out: &mut ScriptBuilder, command: &str, variable: Option<&str>) {
        assign_or_print(out, &self.query_expr(command), variable);
    }

    /// Block until pending operations complete
    fn sync(&self, out: &mut ScriptBuilder) {
        out.line(format!("{}.query(\"*OPC?\")", self.handle()));
    }

    pub fn write_command(&self, out: &mut ScriptBuilder, command: Option<&CommandText>) {
        match command {
            Some(CommandText::Scpi(resolved)) => self.write(out, &resolved.write_form()),
            Some(CommandText::Expression(code)) => out.verbatim(code),
            None => out.warn("write step has no command"),
        }
    }

    pub fn query_command(
        &self,
        out: &mut ScriptBuilder,
        command: Option<&CommandText>,
        variable: Option<&str>,
    ) {
        match command {
            Some(CommandText::Scpi(resolved)) => self.query(out, &resolved.query_form(), variable),
            Some(CommandText::Expression(code)) => assign_or_print(out, code, variable),
            None => out.warn("query step has no command"),
        }
    }

    pub fn set_and_query(
        &self,
        out: &mut ScriptBuilder,
        command: Option<&CommandText>,
        variable: Option<&str>,
    ) {
        match command {
            Some(CommandText::Scpi(resolved)) => {
                self.write(out, &resolved.write_form());
                self.query(out, &resolved.query_form(), variable);
            }
            Some(CommandText::Expression(code)) => out.verbatim(code),
            None => out.warn("set-and-query step has no command"),
        }
    }

    pub fn save_waveform(&self, out: &mut ScriptBuilder, step: &WaveformStep) {
        let waveform = &self.target.config.waveform;
        match step.format {
            WaveformFormat::Binary => {
                let width = step.width.unwrap_or(waveform.binary_width);
                self.curve_setup(out, step, width);
                self.write(out, "CURVe?");
                out.line(format!("raw_data = {}.read_raw()", self.raw()));
                write_local(out, &step.filename, "raw_data");
            }
            WaveformFormat::Csv => {
                let width = step.width.unwrap_or(waveform.csv_width);
                self.curve_setup(out, step, width);
                for (var, query) in SCALING_QUERIES {
                    out.line(format!("{} = float({})", var, self.query_expr(query)));
                }
                let datatype = if width >= 2 { "h" } else { "b" };
                out.line(format!(
                    "samples = {}.query_binary_values(\"CURVe?\", datatype=\"{}\", is_big_endian=True)",
                    self.raw(),
                    datatype
                ));
                out.block(format!("with open({}, \"w\") as f:", py_str(&step.filename)), |b| {
                    b.line("f.write(\"time,voltage\\n\")");
                    b.block("for i, sample in enumerate(samples):", |b| {
                        b.line("f.write(f\"{i * x_incr},{(sample - y_off) * y_mult + y_zero}\\n\")");
                    });
                });
            }
            WaveformFormat::Wfm => self.file_transfer(out, &step.source, &step.filename, "wfm"),
            WaveformFormat::Mat => self.file_transfer(out, &step.source, &step.filename, "mat"),
        }
    }

    /// Source, encoding, width and record window for a `CURVe?` transfer
    fn curve_setup(&self, out: &mut ScriptBuilder, step: &WaveformStep, width: u8) {
        let waveform = &self.target.config.waveform;
        self.write(out, &format!("DATa:SOUrce {}", step.source));
        self.write(out, &format!("DATa:ENCdg {}", waveform.encoding));
        self.write(out, &format!("WFMOutpre:BYT_Nr {}", width));
        match step.record_length {
            Some(length) => {
                self.write(out, "DATa:STARt 1");
                self.write(out, &format!("DATa:STOP {}", length));
            }
            None => {
                out.line(format!(
                    "record_length = int({})",
                    self.query_expr("HORizontal:RECOrdlength?")
                ));
                self.write(out, "DATa:STARt 1");
                self.write_formatted(out, "DATa:STOP {record_length}");
            }
        }
    }

    /// Save on the instrument, read the file back, then delete it
    fn file_transfer(&self, out: &mut ScriptBuilder, source: &str, filename: &str, extension: &str) {
        let remote = self.target.temp_file(extension);
        self.write(out, &format!("SAVe:WAVEform {},\"{}\"", source, remote));
        self.sync(out);
        self.write(out, &format!("FILESystem:READFile \"{}\"", remote));
        out.line(format!("file_data = {}.read_raw()", self.raw()));
        write_local(out, filename, "file_data");
        self.write(out, &format!("FILESystem:DELEte \"{}\"", remote));
    }

    pub fn save_screenshot(&self, out: &mut ScriptBuilder, step: &ScreenshotStep) {
        let remote = self.target.temp_file(step.image_format.extension());
        let capture = self.capture_commands(&remote, step.image_format);
        if self.target.device.connection.is_socket() {
            self.socket_screenshot(out, &capture, &remote, &step.filename);
            return;
        }
        for command in &capture {
            self.write(out, command);
        }
        self.sync(out);
        self.write(out, &format!("FILESystem:READFile \"{}\"", remote));
        out.line(format!("image_data = {}.read_raw()", self.raw()));
        write_local(out, &step.filename, "image_data");
        self.write(out, &format!("FILESystem:DELEte \"{}\"", remote));
    }

    fn capture_commands(&self, remote: &str, format: ImageFormat) -> Vec<String> {
        match self.target.device.generation() {
            Generation::Modern => vec![
                "SAVE:IMAGe:COMPosition NORMal".to_string(),
                format!("SAVE:IMAGe \"{}\"", remote),
            ],
            Generation::Legacy => vec![
                format!("EXPort:FILEName \"{}\"", remote),
                format!("EXPort:FORMat {}", format.scpi_name()),
                "EXPort:VIEW FULLSCREEN".to_string(),
                "HARDCopy START".to_string(),
            ],
        }
    }

    /// Raw-socket transfer that bypasses the VISA session
    ///
    /// Reads until the instrument goes quiet for the configured timeout.
    fn socket_screenshot(
        &self,
        out: &mut ScriptBuilder,
        capture: &[String],
        remote: &str,
        filename: &str,
    ) {
        let connection = &self.target.device.connection;
        let transfer = &self.target.config.transfer;
        let port = connection.port.unwrap_or(self.target.config.visa.socket_port);
        out.require(Import::Socket);
        out.block(
            format!(
                "with socket.create_connection(({}, {}), timeout={}) as sock:",
                py_str(&connection.host),
                port,
                py_float(transfer.socket_timeout_s)
            ),
            |b| {
                for command in capture {
                    b.line(format!("sock.sendall({})", py_bytes(&format!("{}\n", command))));
                }
                b.line(format!("sock.sendall({})", py_bytes("*OPC?\n")));
                b.line("sock.recv(64)");
                b.line(format!(
                    "sock.sendall({})",
                    py_bytes(&format!("FILESystem:READFile \"{}\"\n", remote))
                ));
                b.line("image_data = bytearray()");
                b.block("while True:", |b| {
                    b.block("try:", |b| {
                        b.line(format!("chunk = sock.recv({})", transfer.chunk_size));
                    });
                    b.block("except socket.timeout:", |b| b.line("break"));
                    b.block("if not chunk:", |b| b.line("break"));
                    b.line("image_data.extend(chunk)");
                });
                b.line(format!(
                    "sock.sendall({})",
                    py_bytes(&format!("FILESystem:DELEte \"{}\"\n", remote))
                ));
            },
        );
        write_local(out, filename, "image_data");
    }

    /// Event status check whose failures never stop the program
    pub fn error_check(&self, out: &mut ScriptBuilder, command: Option<&str>) {
        let detail = command.unwrap_or("ALLEV?");
        let esr = self.query_expr("*ESR?");
        let detail = self.query_expr(detail);
        out.block("try:", |b| {
            b.line(format!("esr = int({})", esr));
            b.block("if esr:", |b| {
                b.line(format!("print(\"Event status:\", esr, {})", detail));
            });
        });
        out.block("except Exception:", |b| b.line("pass"));
    }

    pub fn recall(&self, out: &mut ScriptBuilder, step: &RecallStep) {
        let command = match (step.recall, step.filename.as_deref()) {
            (RecallKind::Factory, _) => "*RST".to_string(),
            (RecallKind::Setup, Some(file)) => format!("RECAll:SETUp \"{}\"", file),
            (RecallKind::Session, Some(file)) => format!("RECAll:SESsion \"{}\"", file),
            (RecallKind::Waveform, Some(file)) => format!(
                "RECAll:WAVEform \"{}\",{}",
                file,
                step.reference.as_deref().unwrap_or("REF1")
            ),
            (kind, None) => {
                out.warn(format!("{:?} recall needs a filename", kind).to_lowercase());
                return;
            }
        };
        self.write(out, &command);
        self.sync(out);
    }
}

/// Local binary write of a Python bytes variable
pub(crate) fn write_local(out: &mut ScriptBuilder, filename: &str, variable: &str) {
    out.block(format!("with open({}, \"wb\") as f:", py_str(filename)), |b| {
        b.line(format!("f.write({})", variable));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::model::{Connection, Device};
    use pretty_assertions::assert_eq;

    fn emit(device: &Device, f: impl FnOnce(&Scpi, &mut ScriptBuilder)) -> String {
        let config = GeneratorConfig::default();
        let target = Target::new(device, &config, false);
        let scpi = Scpi::new(&target, PYVISA);
        let mut out = ScriptBuilder::new(4);
        f(&scpi, &mut out);
        out.finish().0
    }

    fn scope() -> Device {
        Device::new("d1", "scope", Connection::tcpip("192.168.1.10"))
    }

    #[test]
    fn test_binary_waveform_order() {
        let step = WaveformStep {
            source: "CH1".to_string(),
            filename: "capture.bin".to_string(),
            format: WaveformFormat::Binary,
            width: None,
            record_length: None,
        };
        let text = emit(&scope(), |scpi, out| scpi.save_waveform(out, &step));
        assert_eq!(
            text,
            r#"scope.write("DATa:SOUrce CH1")
scope.write("DATa:ENCdg RIBinary")
scope.write("WFMOutpre:BYT_Nr 1")
record_length = int(scope.query("HORizontal:RECOrdlength?").strip())
scope.write("DATa:STARt 1")
scope.write(f"DATa:STOP {record_length}")
scope.write("CURVe?")
raw_data = scope.read_raw()
with open("capture.bin", "wb") as f:
    f.write(raw_data)
"#
        );
    }

    #[test]
    fn test_declared_record_length_skips_query() {
        let step = WaveformStep {
            source: "CH2".to_string(),
            filename: "w.bin".to_string(),
            format: WaveformFormat::Binary,
            width: Some(2),
            record_length: Some(10000),
        };
        let text = emit(&scope(), |scpi, out| scpi.save_waveform(out, &step));
        assert!(!text.contains("RECOrdlength"));
        assert!(text.contains("scope.write(\"DATa:STOP 10000\")"));
        assert!(text.contains("WFMOutpre:BYT_Nr 2"));
    }

    #[test]
    fn test_csv_waveform_reads_scaling() {
        let step = WaveformStep {
            source: "CH1".to_string(),
            filename: "w.csv".to_string(),
            format: WaveformFormat::Csv,
            width: None,
            record_length: Some(1000),
        };
        let text = emit(&scope(), |scpi, out| scpi.save_waveform(out, &step));
        for (_, query) in SCALING_QUERIES {
            assert!(text.contains(query), "missing {query}");
        }
        assert!(text.contains("query_binary_values(\"CURVe?\", datatype=\"h\""));
        assert!(text.contains("with open(\"w.csv\", \"w\") as f:"));
    }

    #[test]
    fn test_wfm_file_transfer() {
        let step = WaveformStep {
            source: "CH1".to_string(),
            filename: "local.wfm".to_string(),
            format: WaveformFormat::Wfm,
            width: None,
            record_length: None,
        };
        let text = emit(&scope(), |scpi, out| scpi.save_waveform(out, &step));
        assert_eq!(
            text,
            r#"scope.write('SAVe:WAVEform CH1,"C:/Temp/stepforge_temp.wfm"')
scope.query("*OPC?")
scope.write('FILESystem:READFile "C:/Temp/stepforge_temp.wfm"')
file_data = scope.read_raw()
with open("local.wfm", "wb") as f:
    f.write(file_data)
scope.write('FILESystem:DELEte "C:/Temp/stepforge_temp.wfm"')
"#
        );
    }

    #[test]
    fn test_legacy_screenshot_uses_export() {
        let device = scope().with_driver("scope", Some("DPO7254C"));
        let step = ScreenshotStep {
            filename: "screen.png".to_string(),
            image_format: ImageFormat::Png,
        };
        let text = emit(&device, |scpi, out| scpi.save_screenshot(out, &step));
        assert!(text.contains("EXPort:FILEName \"C:/TekScope/stepforge_temp.png\""));
        assert!(text.contains("HARDCopy START"));
        assert!(!text.contains("SAVE:IMAGe"));
    }

    #[test]
    fn test_socket_screenshot_bypasses_visa() {
        let device = Device::new("d1", "scope", Connection::socket("10.0.0.5", 4000));
        let step = ScreenshotStep {
            filename: "screen.png".to_string(),
            image_format: ImageFormat::Png,
        };
        let config = GeneratorConfig::default();
        let target = Target::new(&device, &config, false);
        let mut out = ScriptBuilder::new(4);
        Scpi::new(&target, PYVISA).save_screenshot(&mut out, &step);
        let imports = out.import_lines();
        let text = out.finish().0;
        assert_eq!(imports, vec!["import socket"]);
        assert!(text.starts_with(
            "with socket.create_connection((\"10.0.0.5\", 4000), timeout=5.0) as sock:\n"
        ));
        assert!(text.contains("        except socket.timeout:\n            break\n"));
        assert!(!text.contains("scope.read_raw()"));
        assert!(text.ends_with("with open(\"screen.png\", \"wb\") as f:\n    f.write(image_data)\n"));
    }

    #[test]
    fn test_error_check_swallows_failures() {
        let text = emit(&scope(), |scpi, out| scpi.error_check(out, None));
        assert_eq!(
            text,
            r#"try:
    esr = int(scope.query("*ESR?").strip())
    if esr:
        print("Event status:", esr, scope.query("ALLEV?").strip())
except Exception:
    pass
"#
        );
    }

    #[test]
    fn test_recall_waveform_reference() {
        let step = RecallStep {
            recall: RecallKind::Waveform,
            filename: Some("C:/w.wfm".to_string()),
            reference: Some("REF2".to_string()),
        };
        let text = emit(&scope(), |scpi, out| scpi.recall(out, &step));
        assert_eq!(
            text,
            "scope.write('RECAll:WAVEform \"C:/w.wfm\",REF2')\nscope.query(\"*OPC?\")\n"
        );
    }

    #[test]
    fn test_recall_without_filename_warns() {
        let step = RecallStep {
            recall: RecallKind::Setup,
            filename: None,
            reference: None,
        };
        let text = emit(&scope(), |scpi, out| scpi.recall(out, &step));
        assert_eq!(text, "# WARNING: setup recall needs a filename\n");
    }

    #[test]
    fn test_tm_devices_dialect_uses_visa_resource() {
        let config = GeneratorConfig::default();
        let device = scope();
        let target = Target::new(&device, &config, false);
        let scpi = Scpi::new(&target, TM_DEVICES);
        assert_eq!(scpi.query_expr("*IDN?"), "scope.query(\"*IDN?\")");
        assert_eq!(scpi.raw(), "scope.visa_resource");
    }
}
