//! Integration tests for compiling whole projects

use pretty_assertions::assert_eq;
use stepforge::model::{parse_steps, steps_to_json, CommandStep, Connection};
use stepforge::{
    compile, Backend, Catalog, CompileError, Device, GeneratorConfig, Project, Step, StepKind,
    TemplateError,
};

const CATALOG: &str = include_str!("fixtures/catalog.json");
const MULTI: &str = include_str!("fixtures/multi_device.json");
const STREAMING: &str = include_str!("fixtures/streaming_only.json");
const HYBRID: &str = include_str!("fixtures/hybrid_project.json");

fn compile_fixture(json: &str) -> stepforge::CompiledScript {
    let project = Project::from_json(json).expect("Should parse project");
    let catalog = Catalog::from_json(CATALOG).expect("Should load catalog");
    compile(&project, &catalog, &GeneratorConfig::default()).expect("Should compile")
}

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
fn test_multi_device_uses_handle_dictionary() {
    let script = compile_fixture(MULTI);
    let source = &script.source;

    assert!(source.contains("devices = {}"));
    assert!(source.contains("devices[\"scope\"] = rm.open_resource("));
    assert!(source.contains(
        "devices[\"afg\"] = dm.add_afg(\"192.168.1.20\", alias=\"afg\", connection_type=\"SOCKET\", port=4001)"
    ));
    assert!(source.contains("devices[\"scope\"].write(\"CH2:SCAle 0.5\")"));
    assert!(source.contains("devices[\"afg\"].write(\"SOURce1:FREQuency 1000\")"));
    assert!(!source.contains("from tm_devices.drivers import"));
    assert!(script.diagnostics.is_empty());
}

#[test]
fn test_every_open_has_one_close() {
    let script = compile_fixture(MULTI);
    let source = &script.source;

    assert_eq!(source.matches("rm.open_resource(").count(), 1);
    assert_eq!(source.matches("dm.add_afg(").count(), 1);
    assert_eq!(source.matches("devices[\"scope\"].close()").count(), 1);
    assert_eq!(source.matches("devices[\"afg\"].close()").count(), 1);

    // The explicit Connect opens the afg after the scope's setup block
    let scope_open = source.find("rm.open_resource(").unwrap_or(usize::MAX);
    let afg_open = source.find("dm.add_afg(").unwrap_or(0);
    assert!(scope_open < afg_open);

    // Disconnect closes the afg before the trailing teardown
    let afg_close = source.find("devices[\"afg\"].close()").unwrap_or(usize::MAX);
    let scope_close = source.find("devices[\"scope\"].close()").unwrap_or(0);
    assert!(afg_close < scope_close);
    assert!(source.trim_end().ends_with("dm.close()\nrm.close()"));
}

#[test]
fn test_single_device_pairs_open_and_close() {
    for backend in [
        Backend::DirectRaw,
        Backend::HighLevelDriver,
        Backend::Streaming,
        Backend::Hybrid,
    ] {
        let devices = vec![Device::new("d1", "scope", Connection::tcpip("10.0.0.3"))];
        let steps = vec![
            Step::new("c", StepKind::Connect),
            Step::new("c2", StepKind::Connect),
            Step::new("s", StepKind::Sleep { seconds: 0.1 }),
        ];
        let project = Project {
            backend,
            devices,
            steps,
        };
        let script = compile(&project, &Catalog::new(), &GeneratorConfig::default())
            .expect("Should compile");
        assert_eq!(
            script.source.matches("scope.close()").count(),
            1,
            "backend {backend}"
        );
        assert!(script.source.contains("# scope is already connected"));
    }
}

#[test]
fn test_streaming_only_scpi_steps_are_flagged() {
    let script = compile_fixture(STREAMING);
    let source = &script.source;

    assert!(source.contains("from tm_data_types import write_file"));
    assert!(source.contains("with scope.access_data():"));
    assert!(source.contains("write_file(\"ch1.wfm\", waveform)"));
    assert!(source.contains("# scope.write(\"*RST\")"));
    assert_eq!(source.matches("# WARNING:").count(), 2);

    let flagged: Vec<Option<&str>> = script
        .diagnostics
        .iter()
        .map(|d| d.step_id.as_deref())
        .collect();
    assert_eq!(flagged, vec![Some("s2"), Some("s3")]);
    assert!(!source.contains("import pyvisa"));
}

#[test]
fn test_no_devices_is_an_error() {
    let project = Project {
        backend: Backend::DirectRaw,
        devices: vec![],
        steps: vec![write("1", "*RST")],
    };
    let result = compile(&project, &Catalog::new(), &GeneratorConfig::default());
    assert!(matches!(result, Err(CompileError::NoDevices)));
}

#[test]
fn test_malformed_templates_name_the_step() {
    for (id, template) in [("bad-index", "CH<x:SCAle"), ("bad-choice", "{A|")] {
        let project = Project {
            backend: Backend::DirectRaw,
            devices: vec![Device::new("d1", "scope", Connection::tcpip("10.0.0.3"))],
            steps: vec![write("ok", "*CLS"), write(id, template)],
        };
        let err = compile(&project, &Catalog::new(), &GeneratorConfig::default())
            .expect_err("Should fail");
        match &err {
            CompileError::Template {
                step_id, source, ..
            } => {
                assert_eq!(step_id, id);
                assert!(matches!(
                    source,
                    TemplateError::Lex { .. } | TemplateError::Syntax { .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains(id));
        assert!(!err.report().is_empty());
    }
}

#[test]
fn test_step_tree_round_trip() {
    for fixture in [MULTI, STREAMING, HYBRID] {
        let project = Project::from_json(fixture).expect("Should parse project");
        let json = steps_to_json(&project.steps).expect("Should serialize");
        assert_eq!(parse_steps(&json).expect("Should parse again"), project.steps);
    }
}

#[test]
fn test_backend_override_changes_emitter() {
    let mut project = Project::from_json(STREAMING).expect("Should parse project");
    project.backend = Backend::DirectRaw;
    let script = compile(&project, &Catalog::new(), &GeneratorConfig::default())
        .expect("Should compile");
    assert!(script.source.contains("scope.write(\"*RST\")"));
    assert!(script.source.contains("SAVe:WAVEform CH1,\"C:/Temp/stepforge_temp.wfm\""));
    assert!(script.diagnostics.is_empty());
}

#[test]
fn test_config_changes_output() {
    let project = Project::from_json(STREAMING).expect("Should parse project");
    let config = GeneratorConfig::from_str(
        r#"
        [python]
        banner = false

        [streaming]
        port = 5001
        "#,
    )
    .expect("Should parse config");
    let script = compile(&project, &Catalog::new(), &config).expect("Should compile");
    assert!(script.source.starts_with("from tekhsi import TekHSIConnect"));
    assert!(script.source.contains("TekHSIConnect(\"10.0.0.7:5001\")"));
}
