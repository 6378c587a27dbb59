//! Processors: filters, amplifier, panner, delay, shaper and the audio sink.
//!
//! None of these start on their own; they only need their properties set
//! and their inputs recorded.

use super::param::ParamHandle;
use super::{Lifetime, Module, ModuleError, ModuleKind, ModuleSpec, OutputRef, Ports};

/// A signal processor with no lifecycle beyond stop.
#[derive(Debug, Clone)]
pub struct Unit {
    ports: Ports,
}

impl Unit {
    pub fn new(kind: ModuleKind) -> Self {
        let defaults: &[(&'static str, f64)] = match kind {
            ModuleKind::Lpf | ModuleKind::Hpf | ModuleKind::Bpf => {
                &[("cutoff", 1000.0), ("resonance", 1.0)]
            }
            ModuleKind::Lsf | ModuleKind::Hsf => &[("cutoff", 1000.0), ("gain", 0.0)],
            ModuleKind::Vca | ModuleKind::Audio => &[("level", 1.0)],
            ModuleKind::Pan => &[("angle", 0.0)],
            ModuleKind::Delay => &[("lag", 0.25)],
            ModuleKind::Shaper => &[("fuzz", 0.5)],
            _ => &[],
        };
        Self {
            ports: Ports::new(kind, defaults),
        }
    }
}

impl Module for Unit {
    fn kind(&self) -> ModuleKind {
        self.ports.kind()
    }

    fn param(&self, name: &str) -> Option<ParamHandle> {
        self.ports.param(name)
    }

    fn connect(&mut self, port: &str, source: OutputRef) -> Result<(), ModuleError> {
        self.ports.connect(port, source)
    }

    fn connections(&self) -> &[(String, OutputRef)] {
        self.ports.connections()
    }

    fn lifetime(&self) -> Lifetime {
        self.ports.lifetime()
    }

    fn stop(&mut self, when: f64) {
        self.ports.stop(when);
    }

    fn declare(&mut self, spec: ModuleSpec) {
        self.ports.declare(spec);
    }
}
