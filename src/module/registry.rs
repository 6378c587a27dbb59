//! Module capability registry: module kind → factory.
//!
//! The parser asks the registry which ports and tweaks a kind declares; the
//! player asks it for fresh instances. Replacing a factory swaps the backend
//! for that kind without touching either.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::config::PatchConfig;

use super::envelope::{Adsr, Decay};
use super::oscillator::{Noise, Oscillator, Waveform};
use super::unit::Unit;
use super::wavetable::Wavetable;
use super::{Module, ModuleError, ModuleKind, ModuleSpec};

const OSC_IN: &[&str] = &["pitch", "detune"];
const PULSE_IN: &[&str] = &["pitch", "detune", "pulsewidth"];
const FILTER_IN: &[&str] = &["in", "cutoff"];
const OUT: &[&str] = &["out"];
const NONE: &[&str] = &[];

fn declare(
    inputs: &'static [&'static str],
    outputs: &'static [&'static str],
    tweaks: &'static [&'static str],
) -> ModuleSpec {
    ModuleSpec {
        inputs,
        outputs,
        tweaks,
    }
}

/// Declared inputs, outputs and tweaks of the built-in module kinds.
pub fn standard_spec(kind: ModuleKind) -> ModuleSpec {
    match kind {
        ModuleKind::SawOsc
        | ModuleKind::SinOsc
        | ModuleKind::SqrOsc
        | ModuleKind::TriOsc
        | ModuleKind::CustomOsc => declare(OSC_IN, OUT, OSC_IN),
        ModuleKind::PulseOsc => declare(PULSE_IN, OUT, PULSE_IN),
        ModuleKind::Noise => declare(&["level"], OUT, &["level"]),
        ModuleKind::Lfo => declare(&["pitch"], OUT, &["pitch", "depth", "offset"]),
        ModuleKind::Lpf | ModuleKind::Hpf | ModuleKind::Bpf => {
            declare(FILTER_IN, OUT, &["cutoff", "resonance"])
        }
        ModuleKind::Lsf | ModuleKind::Hsf => declare(FILTER_IN, OUT, &["cutoff", "gain"]),
        ModuleKind::Vca => declare(&["in", "level"], OUT, &["level"]),
        ModuleKind::Pan => declare(&["in", "angle"], OUT, &["angle"]),
        ModuleKind::Delay => declare(&["in", "lag"], OUT, &["lag"]),
        ModuleKind::Shaper => declare(&["in"], OUT, &["fuzz"]),
        ModuleKind::Adsr => declare(
            NONE,
            OUT,
            &["attack", "decay", "sustain", "release", "level"],
        ),
        ModuleKind::Decay => declare(NONE, OUT, &["attack", "decay", "level"]),
        ModuleKind::Audio => declare(&["in", "level"], NONE, &["level"]),
    }
}

/// What a factory may need to build an instance.
#[derive(Debug, Clone, Copy)]
pub struct CreateContext<'a> {
    /// Resolved table for `CUSTOM-OSC`.
    pub wavetable: Option<&'a Wavetable>,
    pub noise: &'a Arc<[f32]>,
    pub decay_floor: f64,
}

/// Builds instances of one module kind.
pub trait ModuleFactory {
    fn kind(&self) -> ModuleKind;

    fn spec(&self) -> ModuleSpec {
        standard_spec(self.kind())
    }

    fn create(&self, ctx: &CreateContext<'_>) -> Result<Box<dyn Module>, ModuleError>;
}

/// Factory for the built-in virtual modules.
#[derive(Debug, Clone, Copy)]
pub struct StandardFactory(pub ModuleKind);

impl ModuleFactory for StandardFactory {
    fn kind(&self) -> ModuleKind {
        self.0
    }

    fn create(&self, ctx: &CreateContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
        let kind = self.0;
        let module: Box<dyn Module> = match kind {
            ModuleKind::CustomOsc => {
                let table = ctx
                    .wavetable
                    .ok_or(ModuleError::MissingWavetable(kind))?;
                Box::new(Oscillator::custom(table.clone()))
            }
            ModuleKind::Noise => Box::new(Noise::new(Arc::clone(ctx.noise))),
            ModuleKind::Adsr => Box::new(Adsr::new()),
            ModuleKind::Decay => Box::new(Decay::new(ctx.decay_floor)),
            _ => match Waveform::for_kind(kind) {
                Some(waveform) => Box::new(Oscillator::new(kind, waveform)),
                None => Box::new(Unit::new(kind)),
            },
        };
        Ok(module)
    }
}

/// Kind → factory table plus the shared resources factories draw on.
pub struct Registry {
    factories: HashMap<ModuleKind, Box<dyn ModuleFactory>>,
    noise: Arc<[f32]>,
    decay_floor: f64,
}

impl Registry {
    /// Empty registry; nothing can be declared until factories are added.
    pub fn empty(config: &PatchConfig) -> Self {
        Self {
            factories: HashMap::new(),
            noise: white_noise(config.noise_seed, config.noise_len()),
            decay_floor: config.decay_floor,
        }
    }

    /// Registry with a [`StandardFactory`] for every kind.
    pub fn standard(config: &PatchConfig) -> Self {
        let mut registry = Self::empty(config);
        for kind in ModuleKind::ALL {
            registry.register(Box::new(StandardFactory(kind)));
        }
        debug!(
            kinds = registry.factories.len(),
            noise_samples = registry.noise.len(),
            "standard registry ready"
        );
        registry
    }

    /// Add a factory, replacing any previous one for the same kind.
    pub fn register(&mut self, factory: Box<dyn ModuleFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    pub fn factory(&self, kind: ModuleKind) -> Option<&dyn ModuleFactory> {
        self.factories.get(&kind).map(|f| f.as_ref())
    }

    pub fn spec(&self, kind: ModuleKind) -> Option<ModuleSpec> {
        self.factory(kind).map(|f| f.spec())
    }

    pub fn create(
        &self,
        kind: ModuleKind,
        wavetable: Option<&Wavetable>,
    ) -> Result<Box<dyn Module>, ModuleError> {
        let factory = self.factory(kind).ok_or(ModuleError::Unregistered(kind))?;
        let mut module = factory.create(&CreateContext {
            wavetable,
            noise: &self.noise,
            decay_floor: self.decay_floor,
        })?;
        // instances accept exactly the inputs the parser checked against
        module.declare(factory.spec());
        Ok(module)
    }

    pub fn noise(&self) -> &Arc<[f32]> {
        &self.noise
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort();
        f.debug_struct("Registry")
            .field("kinds", &kinds)
            .field("noise", &self.noise.len())
            .finish()
    }
}

/// Seeded white noise in [-1, 1).
fn white_noise(seed: u64, len: usize) -> Arc<[f32]> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::OutputRef;

    fn registry() -> Registry {
        Registry::standard(&PatchConfig {
            sample_rate: 100,
            ..PatchConfig::default()
        })
    }

    #[test]
    fn every_kind_is_registered() {
        let registry = registry();
        for kind in ModuleKind::ALL {
            assert!(registry.spec(kind).is_some(), "{kind} missing");
        }
    }

    #[test]
    fn created_instances_match_their_kind() {
        let registry = registry();
        let table = Wavetable::new(vec![0.0, 1.0], vec![0.0, 0.0]);
        for kind in ModuleKind::ALL {
            let module = registry.create(kind, Some(&table)).unwrap();
            assert_eq!(module.kind(), kind);
            for tweak in registry.spec(kind).unwrap().tweaks {
                assert!(module.param(tweak).is_some(), "{kind}.{tweak}");
            }
        }
    }

    #[test]
    fn start_capability_follows_kind() {
        let registry = registry();
        for kind in ModuleKind::ALL {
            let mut module = registry
                .create(kind, Some(&Wavetable::new(vec![0.0, 1.0], vec![0.0, 0.0])))
                .unwrap();
            let startable = kind.is_oscillator() || matches!(kind, ModuleKind::Noise | ModuleKind::Lfo);
            assert_eq!(module.as_source_mut().is_some(), startable, "{kind}");
            assert_eq!(module.as_envelope_mut().is_some(), kind.is_envelope(), "{kind}");
        }
    }

    #[test]
    fn custom_osc_needs_table() {
        let registry = registry();
        let err = registry.create(ModuleKind::CustomOsc, None).unwrap_err();
        assert_eq!(err, ModuleError::MissingWavetable(ModuleKind::CustomOsc));
    }

    #[test]
    fn empty_registry_rejects_everything() {
        let registry = Registry::empty(&PatchConfig::default());
        assert!(registry.spec(ModuleKind::Vca).is_none());
        assert_eq!(
            registry.create(ModuleKind::Vca, None).unwrap_err(),
            ModuleError::Unregistered(ModuleKind::Vca)
        );
    }

    #[test]
    fn register_replaces_factory() {
        struct QuietVca;
        impl ModuleFactory for QuietVca {
            fn kind(&self) -> ModuleKind {
                ModuleKind::Vca
            }
            fn create(&self, _: &CreateContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
                let mut vca = Unit::new(ModuleKind::Vca);
                vca.set("level", 0.0)?;
                Ok(Box::new(vca))
            }
        }

        let mut registry = registry();
        registry.register(Box::new(QuietVca));
        let vca = registry.create(ModuleKind::Vca, None).unwrap();
        assert_eq!(vca.param("level").unwrap().value(), 0.0);
    }

    #[test]
    fn instances_accept_inputs_their_factory_declares() {
        struct WideVca;
        impl ModuleFactory for WideVca {
            fn kind(&self) -> ModuleKind {
                ModuleKind::Vca
            }
            fn spec(&self) -> ModuleSpec {
                declare(&["in", "level", "side"], OUT, &["level"])
            }
            fn create(&self, _: &CreateContext<'_>) -> Result<Box<dyn Module>, ModuleError> {
                Ok(Box::new(Unit::new(ModuleKind::Vca)))
            }
        }

        let mut registry = registry();
        registry.register(Box::new(WideVca));
        let mut vca = registry.create(ModuleKind::Vca, None).unwrap();
        let source = OutputRef {
            module: "lfo".into(),
            port: "out".into(),
        };
        vca.connect("side", source.clone()).unwrap();
        assert!(vca.connect("cutoff", source).is_err());
    }

    #[test]
    fn noise_is_seeded_and_bounded() {
        let a = white_noise(7, 256);
        let b = white_noise(7, 256);
        let c = white_noise(8, 256);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|s| (-1.0..1.0).contains(s)));
    }

    #[test]
    fn noise_length_from_config() {
        assert_eq!(registry().noise().len(), 100);
    }

    #[test]
    fn declared_ports() {
        let spec = standard_spec(ModuleKind::Lpf);
        assert!(spec.has_input("in"));
        assert!(spec.has_input("cutoff"));
        assert!(!spec.has_input("resonance"));
        assert!(spec.has_tweak("resonance"));
        assert!(spec.has_output("out"));

        let audio = standard_spec(ModuleKind::Audio);
        assert!(audio.outputs.is_empty());
        assert!(standard_spec(ModuleKind::Adsr).inputs.is_empty());
    }
}
