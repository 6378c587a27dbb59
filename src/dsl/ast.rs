//! Statement tree produced by the parser.

use std::fmt;

use serde::Serialize;

use crate::expr::Postfix;
use crate::module::ModuleKind;

/// One parsed line or block, in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "statement", rename_all = "lowercase")]
pub enum Statement {
    Synth(SynthMetadata),
    Parameter(ParameterDecl),
    Module(ModuleDecl),
    Patch(PatchConnection),
    Tweak(TweakStatement),
    Comment { text: String },
}

/// Header block: `@synth shortname` ... `@end`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SynthMetadata {
    pub shortname: String,
    pub longname: String,
    pub version: String,
    pub author: String,
    pub doc: String,
    /// The `type` attribute, e.g. `synth`.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Float,
    Int,
}

impl ParamType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float" => Some(ParamType::Float),
            "int" => Some(ParamType::Int),
            _ => None,
        }
    }
}

/// A control parameter block: `@param name` ... `@end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub mutable: bool,
    pub step: f64,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub doc: String,
}

/// `TYPE:id`, or `CUSTOM-OSC:id TABLE name`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDecl {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

/// `module.port` on either side of a patch or on the left of a tweak.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PortRef {
    pub module: String,
    pub port: String,
}

impl PortRef {
    pub fn new(module: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.port)
    }
}

/// `from.port -> to.port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchConnection {
    pub from: PortRef,
    pub to: PortRef,
}

impl fmt::Display for PatchConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// `module.param = expression`, with the expression already compiled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TweakStatement {
    pub module: String,
    pub param: String,
    pub expression: Postfix,
}
