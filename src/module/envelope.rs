//! Envelope modules: ADSR and exponential decay.
//!
//! An envelope owns no signal path. At note start it schedules ramps on the
//! property it is patched into, and at note-off it reports how long its tail
//! will take so the voice is not torn down early.

use super::param::ParamHandle;
use super::{Envelope, Lifetime, Module, ModuleError, ModuleKind, ModuleSpec, OutputRef, Ports};

/// Attack-Decay-Sustain-Release envelope with linear segments.
///
/// `attack`, `decay` and `release` are in seconds; `sustain` is a fraction of
/// `level`.
#[derive(Debug, Clone)]
pub struct Adsr {
    ports: Ports,
    targets: Vec<ParamHandle>,
}

impl Adsr {
    pub fn new() -> Self {
        Self {
            ports: Ports::new(
                ModuleKind::Adsr,
                &[
                    ("attack", 0.1),
                    ("decay", 0.1),
                    ("sustain", 0.5),
                    ("release", 0.1),
                    ("level", 1.0),
                ],
            ),
            targets: Vec::new(),
        }
    }

    fn times(&self) -> (f64, f64, f64) {
        (
            self.ports.value("attack").max(0.0),
            self.ports.value("decay").max(0.0),
            self.ports.value("release").max(0.0),
        )
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope for Adsr {
    /// - no duration: attack to `level`, decay to `sustain * level`, hold.
    /// - `duration <= attack`: rise partway, then release.
    /// - `duration <= attack + decay`: full attack, partial decay, release.
    /// - longer: full attack and decay, hold sustain until `duration`, release.
    fn apply(&mut self, target: ParamHandle, when: f64, duration: Option<f64>) {
        let (attack, decay, release) = self.times();
        let level = self.ports.value("level");
        let sustain_level = self.ports.value("sustain") * level;

        target.cancel_scheduled_values(when);
        target.set_value_at_time(0.0, when);

        match duration {
            None => {
                target.linear_ramp_to_value_at_time(level, when + attack);
                target.linear_ramp_to_value_at_time(sustain_level, when + attack + decay);
            }
            Some(duration) if duration <= attack => {
                let peak = if attack > 0.0 {
                    level * duration / attack
                } else {
                    level
                };
                target.linear_ramp_to_value_at_time(peak, when + duration);
                target.linear_ramp_to_value_at_time(0.0, when + duration + release);
            }
            Some(duration) if duration <= attack + decay => {
                let through = (duration - attack) / decay;
                let reached = level - (level - sustain_level) * through;
                target.linear_ramp_to_value_at_time(level, when + attack);
                target.linear_ramp_to_value_at_time(reached, when + duration);
                target.linear_ramp_to_value_at_time(0.0, when + duration + release);
            }
            Some(duration) => {
                target.linear_ramp_to_value_at_time(level, when + attack);
                target.linear_ramp_to_value_at_time(sustain_level, when + attack + decay);
                target.linear_ramp_to_value_at_time(sustain_level, when + duration);
                target.linear_ramp_to_value_at_time(0.0, when + duration + release);
            }
        }

        self.targets.push(target);
    }

    fn release_on_note_off(&mut self, when: f64) {
        let (_, _, release) = self.times();
        for target in &self.targets {
            target.hold_at(when);
            target.linear_ramp_to_value_at_time(0.0, when + release);
        }
    }

    fn release_time(&self) -> f64 {
        self.times().2
    }
}

/// Exponentially decaying envelope with a linear attack and no sustain.
///
/// `decay` is the time for the signal to fall from `level` to `floor * level`.
#[derive(Debug, Clone)]
pub struct Decay {
    ports: Ports,
    floor: f64,
    targets: Vec<ParamHandle>,
    curve: ParamHandle,
    release: f64,
}

impl Decay {
    pub fn new(floor: f64) -> Self {
        Self {
            ports: Ports::new(
                ModuleKind::Decay,
                &[("attack", 0.01), ("decay", 0.5), ("level", 1.0)],
            ),
            floor,
            targets: Vec::new(),
            curve: ParamHandle::new(0.0),
            release: 0.0,
        }
    }

    /// Decay rate: `ln(1/floor) / decay`.
    pub fn rate(&self) -> f64 {
        let decay = self.ports.value("decay");
        if decay <= 0.0 {
            return f64::INFINITY;
        }
        (1.0 / self.floor).ln() / decay
    }

    /// The envelope's own output level at `t`.
    pub fn level_at(&self, t: f64) -> f64 {
        self.curve.value_at(t)
    }
}

impl Envelope for Decay {
    /// Duration is ignored; a decay envelope always runs its full course.
    fn apply(&mut self, target: ParamHandle, when: f64, _duration: Option<f64>) {
        let attack = self.ports.value("attack").max(0.0);
        let level = self.ports.value("level");
        let time_constant = 1.0 / self.rate();

        for param in [&self.curve, &target] {
            param.cancel_scheduled_values(when);
            param.set_value_at_time(0.0, when);
            param.linear_ramp_to_value_at_time(level, when + attack);
            param.set_target_at_time(0.0, when + attack, time_constant);
        }
        self.targets.push(target);
    }

    /// The decay keeps running; only the remaining tail is computed, from
    /// the level the envelope has reached at `when`.
    fn release_on_note_off(&mut self, when: f64) {
        let current = self.level_at(when);
        let rate = self.rate();
        self.release = if current <= self.floor || !rate.is_finite() {
            0.0
        } else {
            -(self.floor / current).ln() / rate
        };
    }

    fn release_time(&self) -> f64 {
        self.release
    }
}

macro_rules! envelope_module {
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

            fn as_envelope_mut(&mut self) -> Option<&mut dyn Envelope> {
                Some(self)
            }
        }
    };
}

envelope_module!(Adsr);
envelope_module!(Decay);
