//! End-to-end scenarios: resolution, canonicalization and emission order

use pretty_assertions::assert_eq;
use stepforge::model::{CommandStep, Connection, WaveformFormat, WaveformStep};
use stepforge::{
    assemble, canonicalize, compile, resolve, Backend, Catalog, CommandParam, Device,
    GeneratorConfig, ParamType, ParameterBinding, Project, Step, StepKind,
};

const CATALOG: &str = include_str!("fixtures/catalog.json");
const HYBRID: &str = include_str!("fixtures/hybrid_project.json");

fn catalog() -> Catalog {
    Catalog::from_json(CATALOG).expect("Should load catalog")
}

#[test]
fn test_channel_scale_resolution() {
    let params = vec![
        CommandParam::new("channel", ParamType::Enumeration).with_options(["CH1", "CH2"]),
        CommandParam::new("value", ParamType::Number).with_default("1"),
    ];
    let bindings = ParameterBinding::new()
        .with("channel", "CH2")
        .with("value", "0.5");
    let command = resolve("CH<x>:SCAle {<NR1>}", &params, &bindings).expect("Should resolve");
    assert_eq!(command, "CH2:SCAle 0.5");
}

#[test]
fn test_choice_group_resolution() {
    let bindings = ParameterBinding::new().with("trigger_type", "B");
    let command = resolve("TRIGger:{A|B}:EDGE:SOUrce", &[], &bindings).expect("Should resolve");
    assert_eq!(command, "TRIGger:B:EDGE:SOUrce");
}

#[test]
fn test_duplicate_number_params_collapse() {
    let catalog = catalog();
    let entry = catalog
        .lookup("HORizontal:MODE:SAMPLERate")
        .expect("Should find entry");
    let canonical = canonicalize(&entry.params, &entry.template);
    assert_eq!(canonical.len(), 1);
    assert_eq!(canonicalize(&canonical, &entry.template), canonical);
}

#[test]
fn test_resolution_is_idempotent() {
    let catalog = catalog();
    let entry = catalog.lookup("CH<x>:SCAle").expect("Should find entry");
    let params = canonicalize(&entry.params, &entry.template);
    let bindings = ParameterBinding::new()
        .with("channel", "CH2")
        .with("value", "0.5");
    let once = resolve(&entry.template, &params, &bindings).expect("Should resolve");
    let twice = resolve(&once, &params, &bindings).expect("Should resolve again");
    assert_eq!(once, twice);
}

#[test]
fn test_binary_waveform_order() {
    let devices = vec![Device::new("d1", "scope", Connection::tcpip("192.168.1.10"))];
    let steps = vec![Step::new(
        "w",
        StepKind::SaveWaveform(WaveformStep {
            source: "CH1".to_string(),
            filename: "capture.bin".to_string(),
            format: WaveformFormat::Binary,
            width: None,
            record_length: None,
        }),
    )];
    let source = assemble(&steps, &devices, Backend::DirectRaw).expect("Should assemble");

    assert_eq!(source.matches("HORizontal:RECOrdlength?").count(), 1);
    assert_eq!(source.matches(".read_raw()").count(), 1);
    assert_eq!(source.matches("\"wb\"").count(), 1);

    let record_length = source.find("HORizontal:RECOrdlength?").unwrap_or(usize::MAX);
    let read = source.find(".read_raw()").unwrap_or(usize::MAX);
    let write = source.find("with open(\"capture.bin\", \"wb\")").unwrap_or(usize::MAX);
    assert!(record_length < read);
    assert!(read < write);
}

#[test]
fn test_hybrid_streaming_steps_share_one_context() {
    let project = Project::from_json(HYBRID).expect("Should parse project");
    let config = GeneratorConfig::default().with_identify_on_connect(false);
    let script = compile(&project, &Catalog::new(), &config).expect("Should compile");

    insta::assert_snapshot!(script.source, @r###"
    #!/usr/bin/env python3
    """Generated by stepforge."""

    import pyvisa
    from tekhsi import TekHSIConnect

    rm = pyvisa.ResourceManager()
    scope = rm.open_resource("TCPIP0::192.168.1.10::inst0::INSTR")
    scope.timeout = 5000
    scope_hsi = TekHSIConnect("192.168.1.10:5000")

    scope.write("ACQuire:STATE RUN")
    with scope_hsi.access_data():
        ch1 = scope_hsi.get_data("ch1")
        ch2 = scope_hsi.get_data("ch2")
    scope.write("ACQuire:STATE STOP")

    scope_hsi.close()
    scope.close()
    rm.close()
    "###);
    assert!(script.diagnostics.is_empty());
}

#[test]
fn test_set_and_query_pairs_write_and_query_forms() {
    let devices = vec![Device::new("d1", "scope", Connection::tcpip("192.168.1.10"))];
    let steps = vec![Step::new(
        "sq",
        StepKind::SetAndQuery(stepforge::model::QueryStep {
            command: "CH<x>:SCAle {<NR1>}".to_string(),
            bindings: ParameterBinding::new()
                .with("channel", "CH2")
                .with("value", "0.5"),
            variable: Some("scale".to_string()),
        }),
    )];
    let source = assemble(&steps, &devices, Backend::DirectRaw).expect("Should assemble");
    assert!(source.contains(
        "scope.write(\"CH2:SCAle 0.5\")\nscale = scope.query(\"CH2:SCAle?\").strip()"
    ));
}

#[test]
fn test_write_without_catalog_uses_bound_values() {
    let devices = vec![Device::new("d1", "scope", Connection::tcpip("192.168.1.10"))];
    let steps = vec![Step::new(
        "w",
        StepKind::Write(CommandStep {
            command: "HORizontal:SCAle <NR3>".to_string(),
            bindings: ParameterBinding::new().with("value", "2e-6"),
        }),
    )];
    let source = assemble(&steps, &devices, Backend::DirectRaw).expect("Should assemble");
    assert!(source.contains("scope.write(\"HORizontal:SCAle 2e-6\")"));
}
