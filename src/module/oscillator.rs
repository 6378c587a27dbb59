//! Sources: pitched oscillators, the LFO and the noise generator.

use std::sync::Arc;

use super::param::ParamHandle;
use super::wavetable::Wavetable;
use super::{Lifetime, Module, ModuleError, ModuleKind, ModuleSpec, OutputRef, Ports, Source};

/// Available waveform shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
    Triangle,
    Pulse,
    /// Fourier series from a named wavetable.
    Custom(Wavetable),
}

impl Waveform {
    /// Shape of a plain oscillator kind; `None` for kinds that are not one.
    pub fn for_kind(kind: ModuleKind) -> Option<Self> {
        match kind {
            ModuleKind::SinOsc | ModuleKind::Lfo => Some(Waveform::Sine),
            ModuleKind::SawOsc => Some(Waveform::Saw),
            ModuleKind::SqrOsc => Some(Waveform::Square),
            ModuleKind::TriOsc => Some(Waveform::Triangle),
            ModuleKind::PulseOsc => Some(Waveform::Pulse),
            _ => None,
        }
    }
}

/// Convert a MIDI note number to frequency in Hz.
///
/// Standard tuning: A4 (MIDI 69) = 440 Hz.
pub fn midi_to_freq(note: u8) -> f64 {
    440.0 * 2.0f64.powf((note as f64 - 69.0) / 12.0)
}

/// A periodic source: audio-rate oscillator or LFO.
#[derive(Debug, Clone)]
pub struct Oscillator {
    ports: Ports,
    waveform: Waveform,
}

impl Oscillator {
    /// Oscillator of a plain waveform kind (`SAW-OSC`, `PULSE-OSC`, ...).
    pub fn new(kind: ModuleKind, waveform: Waveform) -> Self {
        let ports = match kind {
            ModuleKind::PulseOsc => Ports::new(
                kind,
                &[("pitch", 440.0), ("detune", 0.0), ("pulsewidth", 0.5)],
            ),
            ModuleKind::Lfo => Ports::new(
                kind,
                &[("pitch", 5.0), ("depth", 1.0), ("offset", 0.0)],
            ),
            _ => Ports::new(kind, &[("pitch", 440.0), ("detune", 0.0)]),
        };
        Self { ports, waveform }
    }

    /// `CUSTOM-OSC` playing the given wavetable.
    pub fn custom(table: Wavetable) -> Self {
        Self::new(ModuleKind::CustomOsc, Waveform::Custom(table))
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }
}

impl Source for Oscillator {
    fn start(&mut self, when: f64) {
        self.ports.start(when);
    }
}

/// White noise read from a buffer shared by every noise module.
#[derive(Debug, Clone)]
pub struct Noise {
    ports: Ports,
    buffer: Arc<[f32]>,
}

impl Noise {
    pub fn new(buffer: Arc<[f32]>) -> Self {
        Self {
            ports: Ports::new(ModuleKind::Noise, &[("level", 1.0)]),
            buffer,
        }
    }

    pub fn buffer(&self) -> &Arc<[f32]> {
        &self.buffer
    }
}

impl Source for Noise {
    fn start(&mut self, when: f64) {
        self.ports.start(when);
    }
}

macro_rules! source_module {
    ($ty:ty) => {
        impl Module for $ty {
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

            fn as_source_mut(&mut self) -> Option<&mut dyn Source> {
                Some(self)
            }
        }
    };
}

source_module!(Oscillator);
source_module!(Noise);
