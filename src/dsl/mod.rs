//! Patch compiler: source text → statements → [`Generator`].

pub mod ast;
pub mod error;
pub mod parser;

pub use ast::*;
pub use error::{ErrorKind, ParseError};

use crate::generator::Generator;
use crate::rack::Rack;

/// The patch compiler.
///
/// Parses source text with the pest grammar, checks it against the rack's
/// module registry, then builds the validated IR.
pub struct Compiler;

impl Compiler {
    /// Parse source into a statement list. A trailing newline is appended.
    pub fn parse(source: &str, rack: &Rack) -> Result<Vec<Statement>, ParseError> {
        let mut text = String::with_capacity(source.len() + 1);
        text.push_str(source);
        text.push('\n');
        parser::parse(&text, &rack.registry)
    }

    /// Parse and build a Generator. Structural problems do not fail here;
    /// they are carried on the returned Generator.
    pub fn compile(source: &str, rack: &Rack) -> Result<Generator, ParseError> {
        let statements = Self::parse(source, rack)?;
        Ok(Generator::new(statements, &rack.wavetables, rack.limits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_without_trailing_newline() {
        let rack = Rack::default();
        let statements = Compiler::parse("@synth s\n@end", &rack).unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn compile_returns_invalid_generator() {
        let rack = Rack::default();
        let generator = Compiler::compile("@synth s\n@end\nSAW-OSC:osc\n", &rack).unwrap();
        assert!(!generator.is_valid());
    }
}
