//! Generator: the validated, immutable IR of one patch.
//!
//! Built once per successful parse and shared read-only by every voice.
//! Structural errors do not prevent construction; they mark the generator
//! invalid and are kept for the caller to report.

mod validate;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::Limits;
use crate::dsl::ast::{
    ModuleDecl, ParameterDecl, PatchConnection, Statement, SynthMetadata, TweakStatement,
};
use crate::module::{ModuleKind, Wavetable, WavetableSet, AUDIO_SINK};

/// Validated patch IR.
#[derive(Debug, Clone, Serialize)]
pub struct Generator {
    synth: SynthMetadata,
    parameters: Vec<ParameterDecl>,
    modules: Vec<ModuleDecl>,
    patches: Vec<PatchConnection>,
    envelopes: Vec<PatchConnection>,
    tweaks: Vec<TweakStatement>,
    maxima: BTreeMap<String, f64>,
    minima: BTreeMap<String, f64>,
    defaults: BTreeMap<String, f64>,
    mutable: BTreeMap<String, bool>,
    /// Resolved tables of `CUSTOM-OSC` modules, by module id.
    #[serde(skip)]
    tables: BTreeMap<String, Wavetable>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Generator {
    pub fn new(statements: Vec<Statement>, wavetables: &WavetableSet, limits: &Limits) -> Self {
        let mut generator = Self {
            synth: SynthMetadata::default(),
            parameters: Vec::new(),
            modules: Vec::new(),
            patches: Vec::new(),
            envelopes: Vec::new(),
            tweaks: Vec::new(),
            maxima: BTreeMap::new(),
            minima: BTreeMap::new(),
            defaults: BTreeMap::new(),
            mutable: BTreeMap::new(),
            tables: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        generator.seed_implicit(limits);

        for statement in statements {
            match statement {
                Statement::Synth(meta) => generator.synth = meta,
                Statement::Parameter(param) => {
                    generator.maxima.insert(param.name.clone(), param.max);
                    generator.minima.insert(param.name.clone(), param.min);
                    generator.defaults.insert(param.name.clone(), param.default);
                    generator.mutable.insert(param.name.clone(), param.mutable);
                    generator.parameters.push(param);
                }
                Statement::Module(decl) => {
                    if let Some(table) = decl.table.as_deref().and_then(|t| wavetables.get(t)) {
                        generator.tables.insert(decl.id.clone(), table.clone());
                    }
                    generator.modules.push(decl);
                }
                Statement::Patch(patch) => {
                    if generator.is_envelope(&patch.from.module) {
                        generator.envelopes.push(patch);
                    } else {
                        generator.patches.push(patch);
                    }
                }
                Statement::Tweak(tweak) => generator.tweaks.push(tweak),
                Statement::Comment { .. } => {}
            }
        }

        generator.errors = validate::check_for_errors(&generator, wavetables);
        generator.warnings = validate::check_for_warnings(&generator);

        debug!(
            synth = %generator.synth.shortname,
            modules = generator.modules.len(),
            patches = generator.patches.len(),
            envelopes = generator.envelopes.len(),
            tweaks = generator.tweaks.len(),
            valid = generator.is_valid(),
            "generator built"
        );
        generator
    }

    fn seed_implicit(&mut self, limits: &Limits) {
        for (name, min, max, default) in [
            ("pitch", limits.pitch_min, limits.pitch_max, limits.pitch_default),
            ("level", limits.level_min, limits.level_max, limits.level_default),
        ] {
            self.minima.insert(name.to_string(), min);
            self.maxima.insert(name.to_string(), max);
            self.defaults.insert(name.to_string(), default);
            self.mutable.insert(name.to_string(), true);
        }
    }

    fn is_envelope(&self, id: &str) -> bool {
        self.module(id).is_some_and(|m| m.kind.is_envelope())
    }

    pub fn synth(&self) -> &SynthMetadata {
        &self.synth
    }

    pub fn parameters(&self) -> &[ParameterDecl] {
        &self.parameters
    }

    pub fn modules(&self) -> &[ModuleDecl] {
        &self.modules
    }

    pub fn module(&self, id: &str) -> Option<&ModuleDecl> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Kind of a declared module, or of the implicit sink.
    pub fn kind_of(&self, id: &str) -> Option<ModuleKind> {
        if id == AUDIO_SINK {
            return Some(ModuleKind::Audio);
        }
        self.module(id).map(|m| m.kind)
    }

    /// Signal and modulation connections.
    pub fn patches(&self) -> &[PatchConnection] {
        &self.patches
    }

    /// Connections whose source is an envelope.
    pub fn envelopes(&self) -> &[PatchConnection] {
        &self.envelopes
    }

    pub fn tweaks(&self) -> &[TweakStatement] {
        &self.tweaks
    }

    pub fn maxima(&self) -> &BTreeMap<String, f64> {
        &self.maxima
    }

    pub fn minima(&self) -> &BTreeMap<String, f64> {
        &self.minima
    }

    pub fn defaults(&self) -> &BTreeMap<String, f64> {
        &self.defaults
    }

    pub fn mutable(&self) -> &BTreeMap<String, bool> {
        &self.mutable
    }

    /// Unknown names are not mutable.
    pub fn is_mutable(&self, name: &str) -> bool {
        self.mutable.get(name).copied().unwrap_or(false)
    }

    pub fn wavetable(&self, module_id: &str) -> Option<&Wavetable> {
        self.tables.get(module_id)
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warning(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn error_string(&self) -> String {
        self.errors.join("\n")
    }

    pub fn warning_string(&self) -> String {
        self.warnings.join("\n")
    }

    /// The IR as a pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
