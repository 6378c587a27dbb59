//! Pest parser and single-pass semantic checks.
//!
//! The grammar only knows the shape of each line. Everything else (known
//! module kinds, declared ports, name clashes, duplicate patches and tweaks,
//! expression validity) is checked here, top to bottom, against running
//! symbol tables. Names must be declared before they are used.

use std::collections::{HashMap, HashSet};

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::expr::{self, PARAM_PREFIX};
use crate::module::{ModuleKind, ModuleSpec, Registry, AUDIO_SINK};

use super::ast::{
    ModuleDecl, ParamType, ParameterDecl, PatchConnection, PortRef, Statement, SynthMetadata,
    TweakStatement,
};
use super::error::ParseError;

#[derive(Parser)]
#[grammar = "dsl/grammar.pest"]
pub struct PatchParser;

/// Parameters every patch has whether declared or not.
pub const IMPLICIT_PARAMS: [&str; 2] = ["pitch", "level"];

/// Parse source text into statements, checking it against the module kinds
/// the registry knows. The source must end with a newline.
pub fn parse(source: &str, registry: &Registry) -> Result<Vec<Statement>, ParseError> {
    let program = PatchParser::parse(Rule::program, source)?
        .next()
        .ok_or_else(|| ParseError::syntax("empty input", 1))?;

    let mut checker = Checker::new(registry);
    for pair in program.into_inner() {
        checker.statement(pair)?;
    }
    checker.finish()
}

fn line_of(pair: &Pair<'_, Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

/// Running symbol tables for one pass over the program.
struct Checker<'r> {
    registry: &'r Registry,
    modules: HashMap<String, ModuleKind>,
    params: HashSet<String>,
    declared_params: HashSet<String>,
    tweaked: HashSet<(String, String)>,
    patches: HashSet<(PortRef, PortRef)>,
    has_synth: bool,
    statements: Vec<Statement>,
}

impl<'r> Checker<'r> {
    fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            modules: HashMap::from([(AUDIO_SINK.to_string(), ModuleKind::Audio)]),
            params: IMPLICIT_PARAMS.iter().map(|p| p.to_string()).collect(),
            declared_params: HashSet::new(),
            tweaked: HashSet::new(),
            patches: HashSet::new(),
            has_synth: false,
            statements: Vec::new(),
        }
    }

    fn statement(&mut self, pair: Pair<'_, Rule>) -> Result<(), ParseError> {
        let statement = match pair.as_rule() {
            Rule::synth_block => Statement::Synth(self.synth(pair)?),
            Rule::param_block => Statement::Parameter(self.parameter(pair)?),
            Rule::module_decl => Statement::Module(self.module(pair)?),
            Rule::patch => Statement::Patch(self.patch(pair)?),
            Rule::tweak => Statement::Tweak(self.tweak(pair)?),
            Rule::comment => Statement::Comment {
                text: pair.as_str().trim_start_matches('#').trim().to_string(),
            },
            _ => return Ok(()),
        };
        self.statements.push(statement);
        Ok(())
    }

    fn finish(self) -> Result<Vec<Statement>, ParseError> {
        if !self.has_synth {
            return Err(ParseError::semantic("missing @synth header", 1));
        }
        Ok(self.statements)
    }

    fn synth(&mut self, pair: Pair<'_, Rule>) -> Result<SynthMetadata, ParseError> {
        let line = line_of(&pair);
        if self.has_synth {
            return Err(ParseError::semantic("only one @synth header is allowed", line));
        }
        self.has_synth = true;

        let mut inner = pair.into_inner();
        let mut meta = SynthMetadata {
            shortname: next_identifier(&mut inner, line)?,
            ..SynthMetadata::default()
        };
        for attr in inner.filter(|p| p.as_rule() == Rule::attribute) {
            let line = line_of(&attr);
            let (key, value) = attribute(attr);
            let field = match key.as_str() {
                "longname" => &mut meta.longname,
                "version" => &mut meta.version,
                "author" => &mut meta.author,
                "doc" => &mut meta.doc,
                "type" => &mut meta.kind,
                _ => {
                    return Err(ParseError::semantic(
                        format!("unknown synth attribute '{key}'"),
                        line,
                    ))
                }
            };
            *field = value;
        }
        Ok(meta)
    }

    fn parameter(&mut self, pair: Pair<'_, Rule>) -> Result<ParameterDecl, ParseError> {
        let line = line_of(&pair);
        let mut inner = pair.into_inner();
        let name = next_identifier(&mut inner, line)?;

        if self.modules.contains_key(&name) {
            return Err(ParseError::semantic(
                format!("parameter '{name}' clashes with a module of the same name"),
                line,
            ));
        }
        let implicit = IMPLICIT_PARAMS.contains(&name.as_str());
        if self.declared_params.contains(&name) || (!implicit && self.params.contains(&name)) {
            return Err(ParseError::semantic(
                format!("parameter '{name}' is already defined"),
                line,
            ));
        }

        let mut ty = ParamType::Float;
        let mut mutable = true;
        let mut step = 0.01;
        let mut doc = String::new();
        let (mut min, mut max, mut default) = (None, None, None);

        for attr in inner.filter(|p| p.as_rule() == Rule::attribute) {
            let line = line_of(&attr);
            let (key, value) = attribute(attr);
            match key.as_str() {
                "type" => {
                    ty = ParamType::from_name(&value).ok_or_else(|| {
                        ParseError::semantic(
                            format!("parameter type must be float or int, not '{value}'"),
                            line,
                        )
                    })?
                }
                "mutable" => {
                    mutable = match value.as_str() {
                        "yes" => true,
                        "no" => false,
                        _ => {
                            return Err(ParseError::semantic(
                                format!("mutable must be yes or no, not '{value}'"),
                                line,
                            ))
                        }
                    }
                }
                "step" => step = number(&key, &value, line)?,
                "min" => min = Some(number(&key, &value, line)?),
                "max" => max = Some(number(&key, &value, line)?),
                "default" => default = Some(number(&key, &value, line)?),
                "doc" => doc = value,
                _ => {
                    return Err(ParseError::semantic(
                        format!("unknown parameter attribute '{key}'"),
                        line,
                    ))
                }
            }
        }

        let required = |value: Option<f64>, key: &str| {
            value.ok_or_else(|| {
                ParseError::semantic(format!("parameter '{name}' is missing '{key}'"), line)
            })
        };
        let decl = ParameterDecl {
            ty,
            mutable,
            step,
            min: required(min, "min")?,
            max: required(max, "max")?,
            default: required(default, "default")?,
            doc,
            name: name.clone(),
        };

        self.params.insert(name.clone());
        self.declared_params.insert(name);
        Ok(decl)
    }

    fn module(&mut self, pair: Pair<'_, Rule>) -> Result<ModuleDecl, ParseError> {
        let line = line_of(&pair);
        let mut inner = pair.into_inner();
        let tag = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
        let id = next_identifier(&mut inner, line)?;
        let table = inner
            .next()
            .and_then(|t| t.into_inner().next())
            .map(|t| t.as_str().to_string());

        let kind = ModuleKind::from_tag(&tag)
            .filter(|kind| self.registry.spec(*kind).is_some())
            .ok_or_else(|| ParseError::semantic(format!("unknown module type '{tag}'"), line))?;

        if self.modules.contains_key(&id) {
            return Err(ParseError::semantic(
                format!("module '{id}' is already defined"),
                line,
            ));
        }
        if self.params.contains(&id) {
            return Err(ParseError::semantic(
                format!("module '{id}' clashes with a parameter of the same name"),
                line,
            ));
        }
        match (kind.takes_wavetable(), &table) {
            (true, None) => {
                return Err(ParseError::semantic(
                    format!("{kind} '{id}' needs a TABLE"),
                    line,
                ))
            }
            (false, Some(_)) => {
                return Err(ParseError::semantic(
                    format!("TABLE is only allowed on {}", ModuleKind::CustomOsc),
                    line,
                ))
            }
            _ => {}
        }

        self.modules.insert(id.clone(), kind);
        Ok(ModuleDecl { id, kind, table })
    }

    fn patch(&mut self, pair: Pair<'_, Rule>) -> Result<PatchConnection, ParseError> {
        let line = line_of(&pair);
        let mut inner = pair.into_inner();
        let from = next_port(&mut inner, line)?;
        let to = next_port(&mut inner, line)?;

        let from_spec = self.declared(&from.module, line)?;
        let to_spec = self.declared(&to.module, line)?;

        if from.module == to.module {
            return Err(ParseError::semantic(
                format!("cannot patch module '{}' into itself", from.module),
                line,
            ));
        }
        if !from_spec.has_output(&from.port) {
            return Err(ParseError::semantic(
                format!("module '{}' has no output '{}'", from.module, from.port),
                line,
            ));
        }
        if !to_spec.has_input(&to.port) {
            return Err(ParseError::semantic(
                format!("module '{}' has no input '{}'", to.module, to.port),
                line,
            ));
        }
        if !self.patches.insert((from.clone(), to.clone())) {
            return Err(ParseError::semantic(
                format!("duplicate patch {from} -> {to}"),
                line,
            ));
        }

        Ok(PatchConnection { from, to })
    }

    fn tweak(&mut self, pair: Pair<'_, Rule>) -> Result<TweakStatement, ParseError> {
        let line = line_of(&pair);
        let mut inner = pair.into_inner();
        let target = next_port(&mut inner, line)?;
        let source = inner.next().map(|p| p.as_str().trim()).unwrap_or_default();

        let spec = self.declared(&target.module, line)?;
        if !spec.has_tweak(&target.port) {
            return Err(ParseError::semantic(
                format!("module '{}' has no tweakable '{}'", target.module, target.port),
                line,
            ));
        }
        let key = (target.module.clone(), target.port.clone());
        if self.tweaked.contains(&key) {
            return Err(ParseError::semantic(
                format!("'{target}' is already tweaked"),
                line,
            ));
        }

        let expression = expr::compile(source).map_err(|e| {
            ParseError::semantic(format!("bad expression '{source}': {e}"), line)
        })?;
        if let Some(unknown) = expression.params().find(|p| !self.params.contains(*p)) {
            return Err(ParseError::semantic(
                format!("unknown parameter '{PARAM_PREFIX}{unknown}'"),
                line,
            ));
        }

        self.tweaked.insert(key);
        Ok(TweakStatement {
            module: target.module,
            param: target.port,
            expression,
        })
    }

    fn declared(&self, id: &str, line: usize) -> Result<ModuleSpec, ParseError> {
        self.modules
            .get(id)
            .and_then(|kind| self.registry.spec(*kind))
            .ok_or_else(|| ParseError::semantic(format!("unknown module '{id}'"), line))
    }
}

fn next_identifier<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    line: usize,
) -> Result<String, ParseError> {
    pairs
        .next()
        .filter(|p| p.as_rule() == Rule::identifier)
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| ParseError::syntax("expected a name", line))
}

fn next_port<'i>(
    pairs: &mut impl Iterator<Item = Pair<'i, Rule>>,
    line: usize,
) -> Result<PortRef, ParseError> {
    let port = pairs
        .next()
        .filter(|p| p.as_rule() == Rule::port)
        .ok_or_else(|| ParseError::syntax("expected module.port", line))?;
    let mut parts = port.into_inner();
    let module = next_identifier(&mut parts, line)?;
    let name = next_identifier(&mut parts, line)?;
    Ok(PortRef::new(module, name))
}

/// Key and unquoted value; a missing value is empty.
fn attribute(pair: Pair<'_, Rule>) -> (String, String) {
    let mut inner = pair.into_inner();
    let key = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
    let value = match inner.next() {
        Some(v) if v.as_rule() == Rule::string => v
            .into_inner()
            .next()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        Some(v) => v.as_str().trim().to_string(),
        None => String::new(),
    };
    (key, value)
}

fn number(key: &str, value: &str, line: usize) -> Result<f64, ParseError> {
    value.parse().map_err(|_| {
        ParseError::semantic(format!("'{key}' must be a number, not '{value}'"), line)
    })
}
