//! Player: one sounding voice of a compiled patch.
//!
//! A player instantiates every declared module plus the `audio` sink, wires
//! the patches, applies the tweaks, and then drives the voice through start,
//! live tweaks and release. Construction order is fixed: instantiate, wire,
//! tweak. Tweaks and wiring both assume every instance already exists.

pub mod voices;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::dsl::ast::TweakStatement;
use crate::expr::{EvalContext, ExprError, ParamValues};
use crate::generator::Generator;
use crate::module::{Module, ModuleError, ModuleKind, OutputRef, ParamHandle, AUDIO_SINK};
use crate::rack::Rack;

pub use voices::{VoiceId, VoiceTable};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("cannot play an invalid patch: {0}")]
    InvalidGenerator(String),
    #[error("unknown module '{0}'")]
    UnknownModule(String),
    #[error("module '{id}': {source}")]
    Module {
        id: String,
        #[source]
        source: ModuleError,
    },
    #[error("tweak {module}.{param}: {source}")]
    Tweak {
        module: String,
        param: String,
        #[source]
        source: ExprError,
    },
    #[error("tweak {module}.{param} evaluates to {value}")]
    NotFinite {
        module: String,
        param: String,
        value: f64,
    },
}

/// Glide every oscillator toward a new voice pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchBend {
    /// Target voice pitch in Hz.
    pub to: f64,
    /// Glide time; defaults to a fraction of the note duration.
    pub time: Option<f64>,
}

type Instances = BTreeMap<String, Box<dyn Module>>;

/// A live voice.
pub struct Player {
    generator: Arc<Generator>,
    instances: Instances,
    values: ParamValues,
    bend_fraction: f64,
}

impl Player {
    /// Build a voice. `overrides` win over the patch's parameter defaults.
    pub fn new(
        generator: Arc<Generator>,
        overrides: &ParamValues,
        rack: &Rack,
    ) -> Result<Self, PlayerError> {
        if !generator.is_valid() {
            return Err(PlayerError::InvalidGenerator(generator.error_string()));
        }

        let mut values = generator.defaults().clone();
        values.extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));

        let mut instances = Instances::new();
        for decl in generator.modules() {
            let module = rack
                .registry
                .create(decl.kind, generator.wavetable(&decl.id))
                .map_err(|source| PlayerError::Module {
                    id: decl.id.clone(),
                    source,
                })?;
            instances.insert(decl.id.clone(), module);
        }
        let sink = rack
            .registry
            .create(ModuleKind::Audio, None)
            .map_err(|source| PlayerError::Module {
                id: AUDIO_SINK.to_string(),
                source,
            })?;
        instances.insert(AUDIO_SINK.to_string(), sink);

        for patch in generator.patches() {
            if !instances.contains_key(&patch.from.module) {
                return Err(PlayerError::UnknownModule(patch.from.module.clone()));
            }
            let target = instances
                .get_mut(&patch.to.module)
                .ok_or_else(|| PlayerError::UnknownModule(patch.to.module.clone()))?;
            let source = OutputRef {
                module: patch.from.module.clone(),
                port: patch.from.port.clone(),
            };
            target
                .connect(&patch.to.port, source)
                .map_err(|source| PlayerError::Module {
                    id: patch.to.module.clone(),
                    source,
                })?;
        }

        let mut player = Self {
            generator,
            instances,
            values,
            bend_fraction: rack.config.bend_fraction,
        };
        let generator = Arc::clone(&player.generator);
        for tweak in generator.tweaks() {
            player.apply(tweak)?;
        }

        debug!(
            synth = %player.generator.synth().shortname,
            instances = player.instances.len(),
            "voice built"
        );
        Ok(player)
    }

    /// Evaluate a tweak against the live values and assign the result.
    fn apply(&mut self, tweak: &TweakStatement) -> Result<(), PlayerError> {
        let (target, value) = self.stage(tweak, &self.values)?;
        target.set_value(value);
        trace!(module = %tweak.module, param = %tweak.param, value, "tweak applied");
        Ok(())
    }

    /// Evaluate a tweak against `values` and resolve its target property,
    /// without assigning anything.
    fn stage(
        &self,
        tweak: &TweakStatement,
        values: &ParamValues,
    ) -> Result<(ParamHandle, f64), PlayerError> {
        let ctx = EvalContext {
            values,
            minima: self.generator.minima(),
            maxima: self.generator.maxima(),
        };
        let value = tweak
            .expression
            .evaluate(&ctx)
            .map_err(|source| PlayerError::Tweak {
                module: tweak.module.clone(),
                param: tweak.param.clone(),
                source,
            })?;
        if !value.is_finite() {
            return Err(PlayerError::NotFinite {
                module: tweak.module.clone(),
                param: tweak.param.clone(),
                value,
            });
        }
        let instance = self
            .instances
            .get(&tweak.module)
            .ok_or_else(|| PlayerError::UnknownModule(tweak.module.clone()))?;
        let target = instance
            .param(&tweak.param)
            .ok_or_else(|| PlayerError::Module {
                id: tweak.module.clone(),
                source: ModuleError::NoSuchProperty {
                    kind: instance.kind(),
                    name: tweak.param.clone(),
                },
            })?;
        Ok((target, value))
    }

    /// Schedule envelopes, start every source, and optionally bend.
    ///
    /// Without `duration` the note is held until [`Player::stop_after_release`].
    pub fn start(&mut self, when: f64, duration: Option<f64>, bend: Option<PitchBend>) {
        let generator = Arc::clone(&self.generator);
        for patch in generator.envelopes() {
            let Some(target) = self
                .instances
                .get(&patch.to.module)
                .and_then(|m| m.param(&patch.to.port))
            else {
                warn!(patch = %patch, "envelope target is not automatable; skipped");
                continue;
            };
            if let Some(envelope) = self
                .instances
                .get_mut(&patch.from.module)
                .and_then(|m| m.as_envelope_mut())
            {
                envelope.apply(target, when, duration);
            }
        }

        for instance in self.instances.values_mut() {
            if let Some(source) = instance.as_source_mut() {
                source.start(when);
            }
        }

        if let Some(bend) = bend {
            self.bend(when, duration, bend);
        }
    }

    /// Retarget every oscillator, keeping its interval to the voice pitch.
    fn bend(&mut self, when: f64, duration: Option<f64>, bend: PitchBend) {
        let Some(time) = bend.time.or(duration.map(|d| d * self.bend_fraction)) else {
            warn!(to = bend.to, "pitch bend has neither a time nor a note duration; skipped");
            return;
        };
        let voice_pitch = self.value("pitch").unwrap_or(0.0);
        if voice_pitch <= 0.0 {
            warn!(voice_pitch, "pitch bend needs a positive voice pitch; skipped");
            return;
        }

        for instance in self.instances.values() {
            if !instance.kind().is_oscillator() {
                continue;
            }
            if let Some(pitch) = instance.param("pitch") {
                let current = pitch.value_at(when);
                pitch.cancel_scheduled_values(when);
                pitch.set_value_at_time(current, when);
                pitch.exponential_ramp_to_value_at_time(
                    current * bend.to / voice_pitch,
                    when + time,
                );
            }
        }
    }

    /// Change a mutable parameter and re-evaluate only the tweaks that use it.
    /// Immutable and unknown parameters are left untouched.
    ///
    /// All or nothing: if any dependent tweak fails, neither the parameter
    /// nor any property changes.
    pub fn apply_tweak_now(&mut self, name: &str, value: f64) -> Result<(), PlayerError> {
        if !self.generator.is_mutable(name) {
            trace!(name, "parameter is not mutable; ignored");
            return Ok(());
        }
        let mut values = self.values.clone();
        values.insert(name.to_string(), value);

        let generator = Arc::clone(&self.generator);
        let staged = generator
            .tweaks()
            .iter()
            .filter(|t| t.expression.references(name))
            .map(|t| self.stage(t, &values))
            .collect::<Result<Vec<_>, _>>()?;

        self.values = values;
        for (target, value) in staged {
            target.set_value(value);
        }
        trace!(name, value, "live tweak committed");
        Ok(())
    }

    /// Release every envelope at `when` and stop every module once the
    /// slowest tail has finished. Returns the teardown time.
    pub fn stop_after_release(&mut self, when: f64) -> f64 {
        let mut release = 0.0f64;
        for instance in self.instances.values_mut() {
            if let Some(envelope) = instance.as_envelope_mut() {
                envelope.release_on_note_off(when);
                release = release.max(envelope.release_time());
            }
        }

        let teardown = when + release;
        for instance in self.instances.values_mut() {
            instance.stop(teardown);
        }
        debug!(when, release, teardown, "voice released");
        teardown
    }

    /// Stop every module at `now`, with no release.
    pub fn stop_immediately(&mut self, now: f64) {
        for instance in self.instances.values_mut() {
            instance.stop(now);
        }
    }

    pub fn generator(&self) -> &Arc<Generator> {
        &self.generator
    }

    pub fn instance(&self, id: &str) -> Option<&dyn Module> {
        self.instances.get(id).map(|m| m.as_ref())
    }

    /// Instances by id, `audio` included.
    pub fn instances(&self) -> impl Iterator<Item = (&str, &dyn Module)> {
        self.instances.iter().map(|(id, m)| (id.as_str(), m.as_ref()))
    }

    pub fn values(&self) -> &ParamValues {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("synth", &self.generator.synth().shortname)
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Compiler;
    use crate::module::Lifetime;
    use assert_approx_eq::assert_approx_eq;

    const SOURCE: &str = "\
@synth lead
@end
@param bright
min: 0
max: 1
default: 0.5
@end
@param drive
mutable: no
min: 0
max: 1
default: 0.2
@end
SAW-OSC:osc
SQR-OSC:sub
LPF:filter
VCA:amp
ADSR:env
osc.out -> filter.in
sub.out -> filter.in
filter.out -> amp.in
amp.out -> audio.in
env.out -> amp.level
osc.pitch = param.pitch
sub.pitch = param.pitch / 2
filter.cutoff = map(param.bright, 200, 4000)
filter.resonance = param.drive * 10
audio.level = param.level
env.release = 0.5
";

    fn player(overrides: &[(&str, f64)]) -> Player {
        let rack = Rack::default();
        let generator = Arc::new(Compiler::compile(SOURCE, &rack).unwrap());
        let overrides = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        Player::new(generator, &overrides, &rack).unwrap()
    }

    fn value(player: &Player, id: &str, param: &str) -> f64 {
        player.instance(id).unwrap().param(param).unwrap().value()
    }

    #[test]
    fn tweaks_applied_at_construction() {
        let p = player(&[("pitch", 220.0)]);
        assert_approx_eq!(value(&p, "osc", "pitch"), 220.0);
        assert_approx_eq!(value(&p, "sub", "pitch"), 110.0);
        assert_approx_eq!(value(&p, "filter", "cutoff"), 2100.0);
        assert_approx_eq!(value(&p, "filter", "resonance"), 2.0);
        assert_approx_eq!(value(&p, "audio", "level"), 0.8);
        assert_approx_eq!(value(&p, "env", "release"), 0.5);
    }

    #[test]
    fn patches_are_wired() {
        let p = player(&[]);
        let inputs: Vec<_> = p
            .instance("filter")
            .unwrap()
            .connections()
            .iter()
            .map(|(port, src)| format!("{}.{} -> {port}", src.module, src.port))
            .collect();
        assert_eq!(inputs, vec!["osc.out -> in", "sub.out -> in"]);
        assert!(p.instance("amp").unwrap().connections().len() == 1);
    }

    #[test]
    fn invalid_generator_rejected() {
        let rack = Rack::default();
        let generator = Arc::new(Compiler::compile("@synth s\n@end\n", &rack).unwrap());
        let err = Player::new(generator, &ParamValues::new(), &rack).unwrap_err();
        assert!(matches!(err, PlayerError::InvalidGenerator(_)));
    }

    #[test]
    fn start_schedules_envelope_and_sources() {
        let mut p = player(&[]);
        p.start(1.0, None, None);
        let level = p.instance("amp").unwrap().param("level").unwrap();
        assert_approx_eq!(level.value_at(1.0), 0.0);
        assert_approx_eq!(level.value_at(1.1), 1.0);

        assert_eq!(p.instance("osc").unwrap().lifetime().started, Some(1.0));
        assert_eq!(p.instance("filter").unwrap().lifetime().started, None);
    }

    #[test]
    fn live_tweak_touches_only_dependents() {
        let mut p = player(&[]);
        p.instance("osc").unwrap().param("pitch").unwrap().set_value(999.0);

        p.apply_tweak_now("bright", 1.0).unwrap();
        assert_approx_eq!(value(&p, "filter", "cutoff"), 4000.0);
        assert_approx_eq!(value(&p, "osc", "pitch"), 999.0);
        assert_eq!(p.value("bright"), Some(1.0));
    }

    #[test]
    fn immutable_parameter_is_ignored() {
        let mut p = player(&[]);
        p.apply_tweak_now("drive", 1.0).unwrap();
        assert_approx_eq!(value(&p, "filter", "resonance"), 2.0);
        assert_eq!(p.value("drive"), Some(0.2));
    }

    const DIVIDER: &str = "\
@synth divider
@end
@param sweep
min: 0
max: 4
default: 1
@end
SAW-OSC:osc
LPF:filter
VCA:amp
osc.out -> filter.in
filter.out -> amp.in
amp.out -> audio.in
amp.level = param.sweep
filter.cutoff = 1 / (param.sweep - param.pitch / 100)
";

    #[test]
    fn failed_live_tweak_changes_nothing() {
        let rack = Rack::default();
        let generator = Arc::new(Compiler::compile(DIVIDER, &rack).unwrap());
        let overrides = ParamValues::from([("pitch".to_string(), 200.0)]);
        let mut p = Player::new(generator, &overrides, &rack).unwrap();
        assert_approx_eq!(value(&p, "filter", "cutoff"), -1.0);

        let err = p.apply_tweak_now("sweep", 2.0).unwrap_err();
        assert!(matches!(err, PlayerError::NotFinite { ref param, .. } if param == "cutoff"));
        assert_eq!(p.value("sweep"), Some(1.0));
        assert_approx_eq!(value(&p, "amp", "level"), 1.0);
        assert_approx_eq!(value(&p, "filter", "cutoff"), -1.0);

        p.apply_tweak_now("sweep", 3.0).unwrap();
        assert_approx_eq!(value(&p, "amp", "level"), 3.0);
        assert_approx_eq!(value(&p, "filter", "cutoff"), 1.0);
    }

    #[test]
    fn random_with_unbounded_span_fails_construction() {
        let rack = Rack::default();
        let source = "@synth s\n@end\nSAW-OSC:osc\nosc.out -> audio.in\n\
                      osc.detune = random(-1e308, 1e308)\n";
        let generator = Arc::new(Compiler::compile(source, &rack).unwrap());
        assert!(generator.is_valid());
        let err = Player::new(generator, &ParamValues::new(), &rack).unwrap_err();
        assert!(matches!(
            err,
            PlayerError::Tweak {
                source: ExprError::RandomRange(..),
                ..
            }
        ));
    }

    #[test]
    fn random_with_nan_bound_is_rejected_at_parse() {
        let rack = Rack::default();
        let source = "@synth s\n@end\nSAW-OSC:osc\nosc.out -> audio.in\n\
                      osc.detune = random(nan, 1)\n";
        let err = Compiler::compile(source, &rack).unwrap_err();
        assert_eq!(err.line, 5);
    }

    #[test]
    fn release_waits_for_slowest_envelope() {
        let mut p = player(&[]);
        p.start(0.0, None, None);
        let teardown = p.stop_after_release(2.0);
        assert_approx_eq!(teardown, 2.5);
        for (_, instance) in p.instances() {
            assert_eq!(instance.lifetime().stopped, Some(2.5));
        }
    }

    #[test]
    fn stop_immediately_skips_release() {
        let mut p = player(&[]);
        p.start(0.0, None, None);
        p.stop_immediately(1.0);
        assert_eq!(
            p.instance("osc").unwrap().lifetime(),
            Lifetime {
                started: Some(0.0),
                stopped: Some(1.0)
            }
        );
    }

    #[test]
    fn bend_keeps_intervals() {
        let mut p = player(&[("pitch", 200.0)]);
        p.start(0.0, Some(2.0), Some(PitchBend { to: 400.0, time: None }));
        let osc = p.instance("osc").unwrap().param("pitch").unwrap();
        let sub = p.instance("sub").unwrap().param("pitch").unwrap();
        // default bend time is 0.75 of the duration
        assert_approx_eq!(osc.value_at(1.5), 400.0);
        assert_approx_eq!(sub.value_at(1.5), 200.0);
        assert_approx_eq!(osc.value_at(0.75), 200.0 * 2f64.sqrt(), 1e-9);
    }

    #[test]
    fn bend_without_time_is_skipped() {
        let mut p = player(&[("pitch", 200.0)]);
        p.start(0.0, None, Some(PitchBend { to: 400.0, time: None }));
        let osc = p.instance("osc").unwrap().param("pitch").unwrap();
        assert_approx_eq!(osc.value_at(10.0), 200.0);
    }
}
