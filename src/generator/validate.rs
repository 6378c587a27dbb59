//! Structural errors and advisory warnings.

use crate::module::{WavetableSet, AUDIO_SINK};

use super::Generator;

const NOT_TO_AUDIO: &str = "nothing is patched into audio.in";

/// Envelope patches drive properties, not the signal path, so they never
/// reach the sink.
fn feeds_audio(generator: &Generator) -> bool {
    generator
        .patches()
        .iter()
        .any(|p| p.to.module == AUDIO_SINK && p.to.port == "in")
}

/// Every structural problem, not just the first.
pub(super) fn check_for_errors(generator: &Generator, wavetables: &WavetableSet) -> Vec<String> {
    let mut errors = Vec::new();

    if generator.patches().is_empty() && generator.envelopes().is_empty() {
        errors.push("nothing is patched".to_string());
    }
    if generator.modules().is_empty() {
        errors.push("no modules are declared".to_string());
    }
    if !feeds_audio(generator) {
        errors.push(NOT_TO_AUDIO.to_string());
    }
    for module in generator.modules() {
        if let Some(table) = &module.table {
            if !wavetables.contains(table) {
                errors.push(format!(
                    "unknown wavetable '{table}' on module '{}'",
                    module.id
                ));
            }
        }
    }

    errors
}

/// Runs whether or not the generator is valid; never affects validity.
pub(super) fn check_for_warnings(generator: &Generator) -> Vec<String> {
    let mut warnings = Vec::new();

    for name in ["pitch", "level"] {
        if !generator.tweaks().iter().any(|t| t.expression.references(name)) {
            warnings.push(format!("param.{name} is not used by any tweak"));
        }
    }
    if !feeds_audio(generator) {
        warnings.push(NOT_TO_AUDIO.to_string());
    }
    for param in generator.parameters() {
        if param.max < param.min {
            warnings.push(format!(
                "parameter '{}': max {} is below min {}",
                param.name, param.max, param.min
            ));
        }
        if param.default < param.min {
            warnings.push(format!(
                "parameter '{}': default {} is below min {}",
                param.name, param.default, param.min
            ));
        }
        if param.default > param.max {
            warnings.push(format!(
                "parameter '{}': default {} is above max {}",
                param.name, param.default, param.max
            ));
        }
    }

    warnings
}
