//! patchlang: a text patch language for synthesizer voices.
//!
//! Patch source is parsed and checked against a module registry
//! ([`dsl::Compiler`]), turned into an immutable [`generator::Generator`],
//! and played one voice per note by [`player::Player`]s.

pub mod config;
pub mod dsl;
pub mod expr;
pub mod generator;
pub mod module;
pub mod player;
pub mod rack;
pub mod schedule;

pub use config::PatchConfig;
pub use dsl::Compiler;
pub use generator::Generator;
pub use player::{PitchBend, Player, PlayerError, VoiceTable};
pub use rack::Rack;
