//! Postfix stack machine.

use std::collections::BTreeMap;

use rand::Rng;

use super::{ExprError, Func, Postfix, Token};

/// Everything an expression can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Current parameter values.
    pub values: &'a BTreeMap<String, f64>,
    /// Declared parameter minima, the input domain for `map`.
    pub minima: &'a BTreeMap<String, f64>,
    /// Declared parameter maxima, the input domain for `map`.
    pub maxima: &'a BTreeMap<String, f64>,
}

impl<'a> EvalContext<'a> {
    fn value(&self, name: &str) -> Result<f64, ExprError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| ExprError::UnknownParam(name.to_string()))
    }

    fn range(&self, name: &str) -> Result<(f64, f64), ExprError> {
        match (self.minima.get(name), self.maxima.get(name)) {
            (Some(lo), Some(hi)) => Ok((*lo, *hi)),
            _ => Err(ExprError::MissingRange(name.to_string())),
        }
    }
}

/// Identifiers stay unresolved on the stack until consumed, so `map` can
/// see which parameter it was handed.
#[derive(Debug, Clone, Copy)]
enum Operand<'p> {
    Value(f64),
    Param(&'p str),
}

impl<'p> Operand<'p> {
    fn resolve(self, ctx: &EvalContext<'_>) -> Result<f64, ExprError> {
        match self {
            Operand::Value(v) => Ok(v),
            Operand::Param(name) => ctx.value(name),
        }
    }

    /// Raw literal, for `random` arguments.
    fn literal(self) -> Result<f64, ExprError> {
        match self {
            Operand::Value(v) => Ok(v),
            Operand::Param(_) => Err(ExprError::RandomArguments),
        }
    }
}

pub(crate) fn evaluate(postfix: &Postfix, ctx: &EvalContext<'_>) -> Result<f64, ExprError> {
    let mut stack: Vec<Operand<'_>> = Vec::with_capacity(postfix.tokens().len());

    for token in postfix.tokens() {
        match token {
            Token::Number(n) => stack.push(Operand::Value(*n)),
            Token::Param(name) => stack.push(Operand::Param(name.as_str())),
            Token::Op(op) => {
                let b = pop(&mut stack, op.symbol())?.resolve(ctx)?;
                let a = pop(&mut stack, op.symbol())?.resolve(ctx)?;
                stack.push(Operand::Value(op.apply(a, b)));
            }
            Token::Func(Func::Log) => {
                let x = pop(&mut stack, "log")?.resolve(ctx)?;
                stack.push(Operand::Value(x.ln()));
            }
            Token::Func(Func::Exp) => {
                let x = pop(&mut stack, "exp")?.resolve(ctx)?;
                stack.push(Operand::Value(x.exp()));
            }
            Token::Func(Func::Random) => {
                let hi = pop(&mut stack, "random")?.literal()?;
                let lo = pop(&mut stack, "random")?.literal()?;
                stack.push(Operand::Value(random_between(lo, hi)?));
            }
            Token::Func(Func::Map) => {
                let out_hi = pop(&mut stack, "map")?.resolve(ctx)?;
                let out_lo = pop(&mut stack, "map")?.resolve(ctx)?;
                let Operand::Param(source) = pop(&mut stack, "map")? else {
                    return Err(ExprError::MapSource);
                };
                let (in_lo, in_hi) = ctx.range(source)?;
                let value = ctx.value(source)?;
                stack.push(Operand::Value(rescale(value, (in_lo, in_hi), (out_lo, out_hi))));
            }
        }
    }

    match stack.as_slice() {
        [only] => only.resolve(ctx),
        [] => Err(ExprError::Empty),
        rest => Err(ExprError::DanglingOperands(rest.len())),
    }
}

fn pop<'p>(stack: &mut Vec<Operand<'p>>, what: &str) -> Result<Operand<'p>, ExprError> {
    stack
        .pop()
        .ok_or_else(|| ExprError::MissingOperand(what.to_string()))
}

/// Uniform sample in `[lo, hi]`; a fresh draw on every call.
fn random_between(lo: f64, hi: f64) -> Result<f64, ExprError> {
    if !(hi - lo).is_finite() {
        return Err(ExprError::RandomRange(lo, hi));
    }
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    if lo == hi {
        return Ok(lo);
    }
    Ok(rand::thread_rng().gen_range(lo..=hi))
}

/// Linear rescale of `value` from the `from` range into the `to` range.
/// A degenerate input range maps everything to the low end of `to`.
pub fn rescale(value: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    let span = from.1 - from.0;
    if span == 0.0 {
        return to.0;
    }
    to.0 + (value - from.0) * (to.1 - to.0) / span
}
