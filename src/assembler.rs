//! Script assembly
//!
//! Binds every step to a device once, then walks the tree depth-first and
//! hands each step to its device's emitter. The assembler owns connection
//! state so every handle opened is closed exactly once, and it wraps runs of
//! streaming-side Hybrid steps in a shared `access_data()` block.

use std::collections::{BTreeSet, HashSet};

use crate::catalog::{Catalog, CommandKind, CommandParam};
use crate::config::GeneratorConfig;
use crate::emitter::hybrid::Segment;
use crate::emitter::{
    emitter_for, is_api_call, CommandText, Diagnostic, Emitter, HybridRouter, Manager,
    ScriptBuilder, Side, Target,
};
use crate::model::{Backend, Device, Step, StepKind};
use crate::template::{canonicalize, Resolver};
use crate::CompileError;

/// Generated program text plus the non-fatal diagnostics raised on the way
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledScript {
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// A step with its device resolved to an index into the device list
#[derive(Debug, Clone)]
pub struct BoundStep<'a> {
    pub step: &'a Step,
    pub device: usize,
    pub children: Vec<BoundStep<'a>>,
}

/// Bind a step tree to devices
///
/// Unbound steps go to the first device. A device reference matches a device
/// id first, then an alias; an unknown reference falls back to the first
/// device with a diagnostic.
pub fn bind<'a>(steps: &'a [Step], devices: &[Device], out: &mut ScriptBuilder) -> Vec<BoundStep<'a>> {
    steps
        .iter()
        .map(|step| {
            let device = match step.device.as_deref() {
                None => 0,
                Some(reference) => match device_index(devices, reference) {
                    Some(index) => index,
                    None => {
                        out.set_step(Some(step.id.as_str()));
                        out.note(format!(
                            "unknown device '{}'; using '{}'",
                            reference,
                            devices.first().map(|d| d.alias.as_str()).unwrap_or("")
                        ));
                        out.set_step(None);
                        0
                    }
                },
            };
            BoundStep {
                step,
                device,
                children: bind(step.children(), devices, out),
            }
        })
        .collect()
}

fn device_index(devices: &[Device], reference: &str) -> Option<usize> {
    devices
        .iter()
        .position(|d| d.id == reference)
        .or_else(|| devices.iter().position(|d| d.alias == reference))
}

/// Compiles step trees against a command catalog and generator configuration
pub struct Assembler<'c> {
    catalog: &'c Catalog,
    config: &'c GeneratorConfig,
}

impl<'c> Assembler<'c> {
    pub fn new(catalog: &'c Catalog, config: &'c GeneratorConfig) -> Self {
        Self { catalog, config }
    }

    /// Assemble a complete Python program
    ///
    /// `backend` applies to every device that does not pick its own.
    pub fn assemble_with_diagnostics(
        &self,
        steps: &[Step],
        devices: &[Device],
        backend: Backend,
    ) -> Result<CompiledScript, CompileError> {
        if devices.is_empty() {
            return Err(CompileError::NoDevices);
        }
        tracing::debug!(
            devices = devices.len(),
            steps = steps.len(),
            %backend,
            "assembling script"
        );

        let multi = devices.len() > 1;
        let mut out = ScriptBuilder::new(self.config.python.indent);
        let bound = bind(steps, devices, &mut out);

        let mut session = Session {
            assembler: self,
            backends: devices.iter().map(|d| d.backend_or(backend)).collect(),
            emitters: devices
                .iter()
                .map(|d| emitter_for(d, d.backend_or(backend)))
                .collect(),
            targets: devices
                .iter()
                .map(|d| Target::new(d, self.config, multi))
                .collect(),
            connected: vec![false; devices.len()],
        };

        let explicit = explicitly_connected(&bound);
        let managers: BTreeSet<Manager> =
            session.emitters.iter().filter_map(|e| e.manager()).collect();

        for manager in &managers {
            manager.setup(&mut out);
        }
        if multi {
            out.line("devices = {}");
        }
        for index in 0..devices.len() {
            if !explicit.contains(&index) {
                session.open(&mut out, index);
            }
        }
        out.blank();

        session.emit_steps(&bound, &mut out)?;
        out.set_step(None);

        out.blank();
        for index in (0..devices.len()).rev() {
            if session.connected[index] {
                session.close(&mut out, index);
            }
        }
        for manager in managers.iter().rev() {
            manager.teardown(&mut out);
        }

        let mut script = ScriptBuilder::new(self.config.python.indent);
        if self.config.python.banner {
            script.line("#!/usr/bin/env python3");
            script.line("\"\"\"Generated by stepforge.\"\"\"");
            script.blank();
        }
        let imports = out.import_lines();
        if !imports.is_empty() {
            for line in imports {
                script.line(line);
            }
            script.blank();
        }
        script.append(out);

        let (source, diagnostics) = script.finish();
        Ok(CompiledScript {
            source,
            diagnostics,
        })
    }
}

/// Assemble with the default configuration and an empty catalog
pub fn assemble(steps: &[Step], devices: &[Device], backend: Backend) -> Result<String, CompileError> {
    let catalog = Catalog::new();
    let config = GeneratorConfig::default();
    Assembler::new(&catalog, &config)
        .assemble_with_diagnostics(steps, devices, backend)
        .map(|script| script.source)
}

/// Devices opened by a Connect step instead of the setup block
fn explicitly_connected(bound: &[BoundStep<'_>]) -> HashSet<usize> {
    fn visit(steps: &[BoundStep<'_>], found: &mut HashSet<usize>) {
        for b in steps {
            if matches!(b.step.kind, StepKind::Connect) {
                found.insert(b.device);
            }
            visit(&b.children, found);
        }
    }
    let mut found = HashSet::new();
    visit(bound, &mut found);
    found
}

/// Emission state for one assembly
struct Session<'a, 'c> {
    assembler: &'a Assembler<'c>,
    backends: Vec<Backend>,
    emitters: Vec<Box<dyn Emitter>>,
    targets: Vec<Target<'a>>,
    connected: Vec<bool>,
}

impl<'a, 'c> Session<'a, 'c> {
    fn open(&mut self, out: &mut ScriptBuilder, index: usize) {
        self.emitters[index].open(out, &self.targets[index]);
        self.connected[index] = true;
    }

    fn close(&mut self, out: &mut ScriptBuilder, index: usize) {
        self.emitters[index].close(out, &self.targets[index]);
        self.connected[index] = false;
    }

    /// Device index when the step belongs in a Hybrid streaming run
    fn streaming_device(&self, bound: &BoundStep<'_>) -> Option<usize> {
        let routable = !matches!(
            bound.step.kind,
            StepKind::Connect | StepKind::Disconnect | StepKind::Group { .. }
        );
        (routable
            && self.backends[bound.device] == Backend::Hybrid
            && HybridRouter::classify(bound.step) == Side::Streaming)
            .then_some(bound.device)
    }

    fn emit_steps(&mut self, steps: &[BoundStep<'_>], out: &mut ScriptBuilder) -> Result<(), CompileError> {
        let segments = HybridRouter::segment(steps, |b| self.streaming_device(b));
        for segment in segments {
            match segment {
                Segment::Single(bound) => self.emit_step(bound, out, false)?,
                Segment::StreamingRun { device, items } => {
                    let handle = self.targets[device].streaming().handle;
                    out.line(format!("with {}.access_data():", handle));
                    out.indent();
                    for bound in items {
                        self.emit_step(bound, out, true)?;
                    }
                    out.dedent();
                }
            }
        }
        Ok(())
    }

    fn emit_step(
        &mut self,
        bound: &BoundStep<'_>,
        out: &mut ScriptBuilder,
        in_stream: bool,
    ) -> Result<(), CompileError> {
        let step = bound.step;
        let index = bound.device;
        let alias = self.targets[index].device.alias.clone();
        out.set_step(Some(step.id.as_str()));
        tracing::debug!(step = %step.id, kind = step.kind.name(), device = %alias, "emitting step");

        match &step.kind {
            StepKind::Group { .. } => {
                out.blank();
                out.comment(&format!("--- {} ---", step.display_name()));
                self.emit_steps(&bound.children, out)?;
            }
            StepKind::Connect => {
                if self.connected[index] {
                    out.comment(&format!("{} is already connected", alias));
                } else {
                    self.open(out, index);
                }
            }
            StepKind::Disconnect => {
                if self.connected[index] {
                    self.close(out, index);
                } else {
                    out.comment(&format!("{} is not connected", alias));
                }
            }
            _ => {
                if !self.connected[index] {
                    out.note(format!("device '{}' is not connected at this step", alias));
                }
                let command = self.command_for(step, out)?;
                let target = if in_stream {
                    self.targets[index].in_stream()
                } else {
                    self.targets[index].clone()
                };
                self.emitters[index].emit(out, &target, step, command.as_ref());
            }
        }
        Ok(())
    }

    /// Resolve the command of a write or query step
    fn command_for(&self, step: &Step, out: &mut ScriptBuilder) -> Result<Option<CommandText>, CompileError> {
        let (command, bindings, writes) = match &step.kind {
            StepKind::Write(c) => (&c.command, &c.bindings, true),
            StepKind::Query(q) => (&q.command, &q.bindings, false),
            StepKind::SetAndQuery(q) => (&q.command, &q.bindings, true),
            _ => return Ok(None),
        };
        if is_api_call(command) {
            return Ok(Some(CommandText::Expression(command.trim().to_string())));
        }

        let entry = self.assembler.catalog.lookup(command);
        let params = match entry {
            Some(entry) => {
                match (entry.kind, writes) {
                    (CommandKind::Query, true) => {
                        out.note(format!("'{}' is query-only in the catalog", entry.name))
                    }
                    (CommandKind::Set, false) => {
                        out.note(format!("'{}' cannot be queried per the catalog", entry.name))
                    }
                    _ => {}
                }
                canonicalize(&entry.params, &entry.template)
            }
            None => {
                let implicit: Vec<CommandParam> = bindings
                    .iter()
                    .filter(|(key, _)| !bindings.is_companion(key))
                    .map(|(key, value)| CommandParam::from_binding(key, value))
                    .collect();
                canonicalize(&implicit, command)
            }
        };
        // A step naming a catalog entry resolves the entry's template
        let template = match entry {
            Some(entry) if entry.name.eq_ignore_ascii_case(command.trim()) => entry.template.as_str(),
            _ => command.as_str(),
        };

        Resolver::new(&params, bindings)
            .resolve_command(template)
            .map(|resolved| Some(CommandText::Scpi(resolved)))
            .map_err(|source| CompileError::Template {
                step_id: step.id.clone(),
                label: step.display_name().to_string(),
                template: template.to_string(),
                source,
            })
    }
}
