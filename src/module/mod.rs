//! Module library: the capability contract every patchable module honours,
//! the declared ports and tweaks of each module kind, and the virtual
//! instances a [`crate::player::Player`] wires together.
//!
//! Instances do not render audio. They hold their automatable properties,
//! record what is connected to them, and remember when they were started
//! and stopped, which is all the player needs to drive a voice.

pub mod envelope;
pub mod oscillator;
pub mod param;
pub mod registry;
pub mod unit;
pub mod wavetable;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

pub use envelope::{Adsr, Decay};
pub use oscillator::{Oscillator, Waveform};
pub use param::{Automation, AutomationEvent, ParamHandle, Ramp};
pub use registry::{standard_spec, CreateContext, ModuleFactory, Registry, StandardFactory};
pub use unit::Unit;
pub use wavetable::{Wavetable, WavetableError, WavetableSet};

/// Id of the implicit output sink present in every voice.
pub const AUDIO_SINK: &str = "audio";

/// Every module type the patch language knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleKind {
    SawOsc,
    SinOsc,
    SqrOsc,
    TriOsc,
    PulseOsc,
    CustomOsc,
    Noise,
    Lfo,
    Lpf,
    Hpf,
    Bpf,
    Lsf,
    Hsf,
    Vca,
    Pan,
    Delay,
    Shaper,
    Adsr,
    Decay,
    /// The implicit `audio` sink; cannot be declared.
    Audio,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 20] = [
        ModuleKind::SawOsc,
        ModuleKind::SinOsc,
        ModuleKind::SqrOsc,
        ModuleKind::TriOsc,
        ModuleKind::PulseOsc,
        ModuleKind::CustomOsc,
        ModuleKind::Noise,
        ModuleKind::Lfo,
        ModuleKind::Lpf,
        ModuleKind::Hpf,
        ModuleKind::Bpf,
        ModuleKind::Lsf,
        ModuleKind::Hsf,
        ModuleKind::Vca,
        ModuleKind::Pan,
        ModuleKind::Delay,
        ModuleKind::Shaper,
        ModuleKind::Adsr,
        ModuleKind::Decay,
        ModuleKind::Audio,
    ];

    /// The tag used in patch source.
    pub fn tag(self) -> &'static str {
        match self {
            ModuleKind::SawOsc => "SAW-OSC",
            ModuleKind::SinOsc => "SIN-OSC",
            ModuleKind::SqrOsc => "SQR-OSC",
            ModuleKind::TriOsc => "TRI-OSC",
            ModuleKind::PulseOsc => "PULSE-OSC",
            ModuleKind::CustomOsc => "CUSTOM-OSC",
            ModuleKind::Noise => "NOISE",
            ModuleKind::Lfo => "LFO",
            ModuleKind::Lpf => "LPF",
            ModuleKind::Hpf => "HPF",
            ModuleKind::Bpf => "BPF",
            ModuleKind::Lsf => "LSF",
            ModuleKind::Hsf => "HSF",
            ModuleKind::Vca => "VCA",
            ModuleKind::Pan => "PAN",
            ModuleKind::Delay => "DELAY",
            ModuleKind::Shaper => "SHAPER",
            ModuleKind::Adsr => "ADSR",
            ModuleKind::Decay => "DECAY",
            ModuleKind::Audio => "AUDIO",
        }
    }

    /// Look up a declarable kind by tag. `AUDIO` is not declarable.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .filter(|k| *k != ModuleKind::Audio)
            .find(|k| k.tag() == tag)
    }

    /// Envelope kinds are applied at note start and release instead of
    /// being wired as signal connections.
    pub fn is_envelope(self) -> bool {
        matches!(self, ModuleKind::Adsr | ModuleKind::Decay)
    }

    pub fn is_oscillator(self) -> bool {
        matches!(
            self,
            ModuleKind::SawOsc
                | ModuleKind::SinOsc
                | ModuleKind::SqrOsc
                | ModuleKind::TriOsc
                | ModuleKind::PulseOsc
                | ModuleKind::CustomOsc
        )
    }

    pub fn takes_wavetable(self) -> bool {
        self == ModuleKind::CustomOsc
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.tag())
    }
}

impl Serialize for ModuleKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

/// Declared ports and tweakable properties of a module kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleSpec {
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
    pub tweaks: &'static [&'static str],
}

impl ModuleSpec {
    pub fn has_input(&self, port: &str) -> bool {
        self.inputs.contains(&port)
    }

    pub fn has_output(&self, port: &str) -> bool {
        self.outputs.contains(&port)
    }

    pub fn has_tweak(&self, name: &str) -> bool {
        self.tweaks.contains(&name)
    }
}

/// An output port of another module, as seen from the input it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub module: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    #[error("{kind} has no input '{port}'")]
    NoSuchInput { kind: ModuleKind, port: String },
    #[error("{kind} has no property '{name}'")]
    NoSuchProperty { kind: ModuleKind, name: String },
    #[error("{0} needs a wavetable")]
    MissingWavetable(ModuleKind),
    #[error("no factory registered for {0}")]
    Unregistered(ModuleKind),
}

/// Start/stop times of an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Lifetime {
    pub started: Option<f64>,
    pub stopped: Option<f64>,
}

/// Runtime contract between the player and a module instance.
pub trait Module: fmt::Debug {
    fn kind(&self) -> ModuleKind;

    /// Handle to a settable property or modulatable input.
    fn param(&self, name: &str) -> Option<ParamHandle>;

    /// Feed `source` into the named input.
    fn connect(&mut self, port: &str, source: OutputRef) -> Result<(), ModuleError>;

    /// What is connected to each input.
    fn connections(&self) -> &[(String, OutputRef)];

    fn lifetime(&self) -> Lifetime;

    /// Tear down at `when`. Every module can be stopped.
    fn stop(&mut self, when: f64);

    /// Replace the declared ports `connect` checks against.
    fn declare(&mut self, spec: ModuleSpec);

    /// Modules that produce sound or control on their own must be started.
    fn as_source_mut(&mut self) -> Option<&mut dyn Source> {
        None
    }

    fn as_envelope_mut(&mut self) -> Option<&mut dyn Envelope> {
        None
    }

    /// Assign a tweak result to a settable property.
    fn set(&mut self, name: &str, value: f64) -> Result<(), ModuleError> {
        let handle = self.param(name).ok_or_else(|| ModuleError::NoSuchProperty {
            kind: self.kind(),
            name: name.to_string(),
        })?;
        handle.set_value(value);
        Ok(())
    }
}

/// Start capability.
pub trait Source {
    fn start(&mut self, when: f64);
}

/// Envelope capability: time-scheduled ramps on another module's property.
pub trait Envelope {
    /// Schedule the envelope onto `target` from `when`. Without `duration` the
    /// note is held until [`Envelope::release_on_note_off`].
    fn apply(&mut self, target: ParamHandle, when: f64, duration: Option<f64>);

    /// Begin the release at `when` on every target applied so far.
    fn release_on_note_off(&mut self, when: f64);

    /// How long the tail lasts after the most recent note-off.
    fn release_time(&self) -> f64;
}

/// Named automatable properties plus recorded connections and lifetime;
/// the shared bookkeeping of every built-in module.
#[derive(Debug, Clone)]
pub struct Ports {
    kind: ModuleKind,
    spec: ModuleSpec,
    params: BTreeMap<&'static str, ParamHandle>,
    connections: Vec<(String, OutputRef)>,
    lifetime: Lifetime,
}

impl Ports {
    pub fn new(kind: ModuleKind, defaults: &[(&'static str, f64)]) -> Self {
        Self {
            kind,
            spec: standard_spec(kind),
            params: defaults
                .iter()
                .map(|&(name, value)| (name, ParamHandle::new(value)))
                .collect(),
            connections: Vec::new(),
            lifetime: Lifetime::default(),
        }
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Ports declared by the factory that built this instance.
    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    pub fn declare(&mut self, spec: ModuleSpec) {
        self.spec = spec;
    }

    pub fn param(&self, name: &str) -> Option<ParamHandle> {
        self.params.get(name).cloned()
    }

    /// Current intrinsic value of a property, 0 when absent.
    pub fn value(&self, name: &str) -> f64 {
        self.params.get(name).map_or(0.0, ParamHandle::value)
    }

    pub fn connect(&mut self, port: &str, source: OutputRef) -> Result<(), ModuleError> {
        if !self.spec.has_input(port) {
            return Err(ModuleError::NoSuchInput {
                kind: self.kind,
                port: port.to_string(),
            });
        }
        self.connections.push((port.to_string(), source));
        Ok(())
    }

    pub fn connections(&self) -> &[(String, OutputRef)] {
        &self.connections
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn start(&mut self, when: f64) {
        self.lifetime.started = Some(when);
    }

    pub fn stop(&mut self, when: f64) {
        self.lifetime.stopped = Some(when);
    }
}
