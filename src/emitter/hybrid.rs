//! Hybrid backend: a command session plus a TekHSI streaming session
//!
//! Every step goes to exactly one side. [`HybridRouter`] decides which, and
//! groups contiguous streaming-side steps into runs so the assembler can
//! share one `access_data()` block between them.

use crate::emitter::{
    is_streaming_call, CommandText, Emitter, Manager, PyVisaEmitter, ScriptBuilder, Target,
    TekHsiEmitter, TmDevicesEmitter,
};
use crate::model::{Backend, Device, HybridBase, Route, Step, StepKind};

/// Sub-backend a Hybrid step is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Command,
    Streaming,
}

impl From<Route> for Side {
    fn from(route: Route) -> Self {
        match route {
            Route::Command => Side::Command,
            Route::Streaming => Side::Streaming,
        }
    }
}

/// A slice of siblings as the assembler emits them
#[derive(Debug, PartialEq)]
pub enum Segment<'s, T> {
    Single(&'s T),
    /// Contiguous streaming-side steps of one device
    StreamingRun { device: usize, items: &'s [T] },
}

pub struct HybridRouter;

impl HybridRouter {
    /// Side for one step. An explicit route tag is never overridden.
    pub fn classify(step: &Step) -> Side {
        if let Some(route) = step.route {
            return route.into();
        }
        match &step.kind {
            StepKind::Write(_)
            | StepKind::Query(_)
            | StepKind::SetAndQuery(_)
            | StepKind::DriverCall { .. }
            | StepKind::PythonPassthrough { .. } => match step.text() {
                Some(text) if is_streaming_call(text) => Side::Streaming,
                _ => Side::Command,
            },
            StepKind::Connect
            | StepKind::Disconnect
            | StepKind::Sleep { .. }
            | StepKind::SaveWaveform(_)
            | StepKind::Comment { .. }
            | StepKind::SaveScreenshot(_)
            | StepKind::ErrorCheck { .. }
            | StepKind::Recall(_)
            | StepKind::Group { .. } => Side::Command,
        }
    }

    /// Split siblings into singles and streaming runs.
    ///
    /// `streaming_device` returns the device index when the item is a
    /// streaming-side step of a Hybrid device. A run ends at the first item
    /// that is not, or that belongs to another device.
    pub fn segment<'s, T>(
        items: &'s [T],
        streaming_device: impl Fn(&T) -> Option<usize>,
    ) -> Vec<Segment<'s, T>> {
        let mut segments = Vec::new();
        let mut i = 0;
        while i < items.len() {
            match streaming_device(&items[i]) {
                Some(device) => {
                    let start = i;
                    while i < items.len() && streaming_device(&items[i]) == Some(device) {
                        i += 1;
                    }
                    segments.push(Segment::StreamingRun {
                        device,
                        items: &items[start..i],
                    });
                }
                None => {
                    segments.push(Segment::Single(&items[i]));
                    i += 1;
                }
            }
        }
        segments
    }
}

pub struct HybridEmitter {
    base: Box<dyn Emitter>,
    streaming: TekHsiEmitter,
}

impl HybridEmitter {
    pub fn for_device(device: &Device) -> Self {
        let base: Box<dyn Emitter> = match device.hybrid_base() {
            HybridBase::Raw => Box::new(PyVisaEmitter),
            HybridBase::Driver => Box::new(TmDevicesEmitter),
        };
        Self {
            base,
            streaming: TekHsiEmitter,
        }
    }

    pub fn base_backend(&self) -> Backend {
        self.base.backend()
    }
}

impl Emitter for HybridEmitter {
    fn backend(&self) -> Backend {
        Backend::Hybrid
    }

    fn manager(&self) -> Option<Manager> {
        self.base.manager()
    }

    fn open(&self, out: &mut ScriptBuilder, target: &Target<'_>) {
        self.base.open(out, target);
        self.streaming.open(out, &target.streaming());
    }

    fn close(&self, out: &mut ScriptBuilder, target: &Target<'_>) {
        self.streaming.close(out, &target.streaming());
        self.base.close(out, target);
    }

    fn emit(
        &self,
        out: &mut ScriptBuilder,
        target: &Target<'_>,
        step: &Step,
        command: Option<&CommandText>,
    ) {
        match HybridRouter::classify(step) {
            Side::Streaming => self.streaming.emit(out, &target.streaming(), step, command),
            Side::Command => self.base.emit(out, target, step, command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::model::{CommandStep, Connection, QueryStep, WaveformFormat, WaveformStep};
    use pretty_assertions::assert_eq;

    fn write(id: &str, command: &str) -> Step {
        Step::new(
            id,
            StepKind::Write(CommandStep {
                command: command.to_string(),
                bindings: Default::default(),
            }),
        )
    }

    #[test]
    fn test_classify_sniffs_streaming_calls() {
        assert_eq!(HybridRouter::classify(&write("a", "CH1:SCAle 0.5")), Side::Command);
        assert_eq!(
            HybridRouter::classify(&write("b", "names = scope_hsi.source_names")),
            Side::Streaming
        );
        let query = Step::new(
            "c",
            StepKind::Query(QueryStep {
                command: "scope_hsi.get_data(\"ch1\")".to_string(),
                bindings: Default::default(),
                variable: Some("wf".to_string()),
            }),
        );
        assert_eq!(HybridRouter::classify(&query), Side::Streaming);
        assert_eq!(HybridRouter::classify(&Step::new("d", StepKind::Sleep { seconds: 1.0 })), Side::Command);
    }

    #[test]
    fn test_explicit_route_wins_over_sniffing() {
        let step = write("a", "scope_hsi.get_data(\"ch1\")").with_route(Route::Command);
        assert_eq!(HybridRouter::classify(&step), Side::Command);
        let step = write("b", "*CLS").with_route(Route::Streaming);
        assert_eq!(HybridRouter::classify(&step), Side::Streaming);
    }

    #[test]
    fn test_waveform_stays_on_command_side_unless_tagged() {
        let waveform = Step::new(
            "w",
            StepKind::SaveWaveform(WaveformStep {
                source: "CH1".to_string(),
                filename: "cap.bin".to_string(),
                format: WaveformFormat::Binary,
                width: None,
                record_length: None,
            }),
        );
        assert_eq!(HybridRouter::classify(&waveform), Side::Command);
        let tagged = waveform.with_route(Route::Streaming);
        assert_eq!(HybridRouter::classify(&tagged), Side::Streaming);
    }

    #[test]
    fn test_segment_merges_contiguous_runs() {
        // (device, streaming-side)
        let items = [(0, false), (0, true), (0, true), (0, false), (0, true), (1, true)];
        let segments = HybridRouter::segment(&items, |&(device, streaming)| {
            streaming.then_some(device)
        });
        assert_eq!(
            segments,
            vec![
                Segment::Single(&items[0]),
                Segment::StreamingRun { device: 0, items: &items[1..3] },
                Segment::Single(&items[3]),
                Segment::StreamingRun { device: 0, items: &items[4..5] },
                Segment::StreamingRun { device: 1, items: &items[5..6] },
            ]
        );
    }

    #[test]
    fn test_open_and_close_order() {
        let config = GeneratorConfig::default().with_identify_on_connect(false);
        let device = Device::new("d1", "scope", Connection::tcpip("10.0.0.1"))
            .with_backend(Backend::Hybrid);
        let target = Target::new(&device, &config, false);
        let emitter = HybridEmitter::for_device(&device);
        assert_eq!(emitter.base_backend(), Backend::DirectRaw);

        let mut out = ScriptBuilder::new(4);
        emitter.open(&mut out, &target);
        emitter.close(&mut out, &target);
        assert_eq!(
            out.finish().0,
            r#"scope = rm.open_resource("TCPIP0::10.0.0.1::inst0::INSTR")
scope.timeout = 5000
scope_hsi = TekHSIConnect("10.0.0.1:5000")
scope_hsi.close()
scope.close()
"#
        );
    }

    #[test]
    fn test_driver_base() {
        let device = Device::new("d1", "scope", Connection::tcpip("10.0.0.1"))
            .with_hybrid_base(HybridBase::Driver);
        let emitter = HybridEmitter::for_device(&device);
        assert_eq!(emitter.base_backend(), Backend::HighLevelDriver);
        assert_eq!(emitter.manager(), Some(Manager::Devices));
    }
}
