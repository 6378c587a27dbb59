//! Tweak expressions: infix arithmetic over control parameters, compiled to
//! postfix and evaluated on a stack machine.
//!
//! ```text
//! log(param.cutoff) + exp(param.resonance)   →   param.cutoff log param.resonance exp +
//! ```

pub mod compile;
pub mod eval;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

pub use compile::compile;
pub use eval::EvalContext;

/// Prefix marking a control-parameter reference inside an expression.
pub const PARAM_PREFIX: &str = "param.";

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    pub fn precedence(self) -> u8 {
        match self {
            Op::Add | Op::Sub => 1,
            Op::Mul | Op::Div => 2,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
        }
    }
}

/// Built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Log,
    Exp,
    Random,
    Map,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "log" => Some(Func::Log),
            "exp" => Some(Func::Exp),
            "random" => Some(Func::Random),
            "map" => Some(Func::Map),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Func::Log => "log",
            Func::Exp => "exp",
            Func::Random => "random",
            Func::Map => "map",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Func::Log | Func::Exp => 1,
            Func::Random => 2,
            Func::Map => 3,
        }
    }
}

/// A single postfix token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    /// Parameter name without the `param.` prefix.
    Param(String),
    Op(Op),
    Func(Func),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Param(name) => write!(f, "{PARAM_PREFIX}{name}"),
            Token::Op(op) => f.write_str(op.symbol()),
            Token::Func(func) => f.write_str(func.name()),
        }
    }
}

// Numbers stay numbers in the IR; everything else is written the way it
// appears in source.
impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Token::Number(n) => serializer.serialize_f64(*n),
            other => serializer.collect_str(other),
        }
    }
}

/// A compiled tweak expression in operator-last order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Postfix(Vec<Token>);

impl Postfix {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self(tokens)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every parameter name referenced, in order of appearance.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|t| match t {
            Token::Param(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Whether the expression mentions `param.<name>`.
    pub fn references(&self, name: &str) -> bool {
        self.params().any(|p| p == name)
    }

    /// Evaluate against the live parameter values.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<f64, ExprError> {
        eval::evaluate(self, ctx)
    }
}

impl fmt::Display for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

/// Errors raised while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,
    #[error("unrecognised token '{0}'")]
    UnknownToken(String),
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    #[error("'{0}' is missing an operand")]
    MissingOperand(String),
    #[error("expression leaves {0} values; expected exactly one")]
    DanglingOperands(usize),
    #[error("random() takes two numeric literals")]
    RandomArguments,
    #[error("random({0}, {1}) spans more than a float can hold")]
    RandomRange(f64, f64),
    #[error("map() takes a param. reference as its first argument")]
    MapSource,
    #[error("unknown parameter '{0}'")]
    UnknownParam(String),
    #[error("parameter '{0}' has no declared range")]
    MissingRange(String),
}

/// Parameter values keyed by name, as held by a voice.
pub type ParamValues = BTreeMap<String, f64>;
