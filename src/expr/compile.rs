//! Infix → postfix compilation.
//!
//! Lexing splits on the operator class `+ - * / ( ) ,`. Unary minus is only
//! understood in front of numeric literals and is folded into the literal
//! before shunting-yard runs, since shunting-yard treats `-` as binary.

use super::{ExprError, Func, Op, Postfix, Token, PARAM_PREFIX};

/// Intermediate lexeme, before parens and commas are consumed.
#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Number(f64),
    Param(String),
    Op(Op),
    Func(Func),
    LParen,
    RParen,
    Comma,
}

impl Lexeme {
    fn opens_operand(&self) -> bool {
        matches!(self, Lexeme::LParen | Lexeme::Comma | Lexeme::Op(_))
    }
}

/// Stack entry during shunting-yard.
#[derive(Debug, Clone, Copy)]
enum Pending {
    Op(Op),
    Func(Func),
    LParen,
}

/// Compile an infix expression into postfix form.
///
/// Malformed input (unbalanced parentheses, wrong operand counts, bad
/// `random`/`map` arguments) is rejected rather than evaluated best-effort.
pub fn compile(infix: &str) -> Result<Postfix, ExprError> {
    let lexemes = fold_unary_minus(lex(infix)?);
    if lexemes.is_empty() {
        return Err(ExprError::Empty);
    }
    let postfix = shunting_yard(lexemes)?;
    check_arity(&postfix)?;
    Ok(postfix)
}

fn lex(infix: &str) -> Result<Vec<Lexeme>, ExprError> {
    let mut lexemes = Vec::new();
    let mut word = String::new();

    for ch in infix.chars() {
        let delimiter = match ch {
            '+' => Some(Lexeme::Op(Op::Add)),
            '-' => Some(Lexeme::Op(Op::Sub)),
            '*' => Some(Lexeme::Op(Op::Mul)),
            '/' => Some(Lexeme::Op(Op::Div)),
            '(' => Some(Lexeme::LParen),
            ')' => Some(Lexeme::RParen),
            ',' => Some(Lexeme::Comma),
            _ => None,
        };
        match delimiter {
            Some(lexeme) => {
                push_word(&mut lexemes, &word)?;
                word.clear();
                lexemes.push(lexeme);
            }
            None => word.push(ch),
        }
    }
    push_word(&mut lexemes, &word)?;
    Ok(lexemes)
}

fn push_word(lexemes: &mut Vec<Lexeme>, word: &str) -> Result<(), ExprError> {
    let word = word.trim();
    if word.is_empty() {
        return Ok(());
    }
    let lexeme = if let Ok(n) = word.parse::<f64>() {
        if !n.is_finite() {
            return Err(ExprError::UnknownToken(word.to_string()));
        }
        Lexeme::Number(n)
    } else if let Some(name) = word.strip_prefix(PARAM_PREFIX) {
        if !is_identifier(name) {
            return Err(ExprError::UnknownToken(word.to_string()));
        }
        Lexeme::Param(name.to_string())
    } else if let Some(func) = Func::from_name(word) {
        Lexeme::Func(func)
    } else {
        return Err(ExprError::UnknownToken(word.to_string()));
    };
    lexemes.push(lexeme);
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Fold `-` into the following literal when it is a sign, not a subtraction.
fn fold_unary_minus(lexemes: Vec<Lexeme>) -> Vec<Lexeme> {
    let mut out: Vec<Lexeme> = Vec::with_capacity(lexemes.len());
    let mut iter = lexemes.into_iter().peekable();

    while let Some(lexeme) = iter.next() {
        let is_sign = lexeme == Lexeme::Op(Op::Sub)
            && out.last().map_or(true, Lexeme::opens_operand)
            && matches!(iter.peek(), Some(Lexeme::Number(_)));
        if is_sign {
            if let Some(Lexeme::Number(n)) = iter.next() {
                out.push(Lexeme::Number(-n));
            }
            continue;
        }
        out.push(lexeme);
    }
    out
}

fn shunting_yard(lexemes: Vec<Lexeme>) -> Result<Postfix, ExprError> {
    let mut output = Vec::with_capacity(lexemes.len());
    let mut stack: Vec<Pending> = Vec::new();

    for lexeme in lexemes {
        match lexeme {
            Lexeme::Number(n) => output.push(Token::Number(n)),
            Lexeme::Param(name) => output.push(Token::Param(name)),
            Lexeme::Func(func) => stack.push(Pending::Func(func)),
            Lexeme::Op(op) => {
                while let Some(Pending::Op(top)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    output.push(Token::Op(*top));
                    stack.pop();
                }
                stack.push(Pending::Op(op));
            }
            Lexeme::LParen => stack.push(Pending::LParen),
            Lexeme::Comma => loop {
                match stack.last() {
                    Some(Pending::LParen) => break,
                    Some(Pending::Op(op)) => {
                        output.push(Token::Op(*op));
                        stack.pop();
                    }
                    _ => return Err(ExprError::UnbalancedParens),
                }
            },
            Lexeme::RParen => {
                loop {
                    match stack.pop() {
                        Some(Pending::LParen) => break,
                        Some(Pending::Op(op)) => output.push(Token::Op(op)),
                        Some(Pending::Func(_)) | None => return Err(ExprError::UnbalancedParens),
                    }
                }
                if let Some(Pending::Func(func)) = stack.last() {
                    output.push(Token::Func(*func));
                    stack.pop();
                }
            }
        }
    }

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Op(op) => output.push(Token::Op(op)),
            Pending::Func(func) => return Err(ExprError::MissingOperand(func.name().to_string())),
            Pending::LParen => return Err(ExprError::UnbalancedParens),
        }
    }

    Ok(Postfix::new(output))
}

/// What a stack slot holds at compile time; enough to check argument rules.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Literal,
    Param,
    Computed,
}

fn check_arity(postfix: &Postfix) -> Result<(), ExprError> {
    let mut stack: Vec<Slot> = Vec::new();

    for token in postfix.tokens() {
        match token {
            Token::Number(_) => stack.push(Slot::Literal),
            Token::Param(_) => stack.push(Slot::Param),
            Token::Op(op) => {
                pop_n(&mut stack, 2, op.symbol())?;
                stack.push(Slot::Computed);
            }
            Token::Func(func) => {
                let args = pop_n(&mut stack, func.arity(), func.name())?;
                match func {
                    Func::Random if args.iter().any(|s| *s != Slot::Literal) => {
                        return Err(ExprError::RandomArguments);
                    }
                    Func::Map if args[0] != Slot::Param => return Err(ExprError::MapSource),
                    _ => {}
                }
                stack.push(Slot::Computed);
            }
        }
    }

    match stack.len() {
        1 => Ok(()),
        0 => Err(ExprError::Empty),
        n => Err(ExprError::DanglingOperands(n)),
    }
}

fn pop_n(stack: &mut Vec<Slot>, n: usize, what: &str) -> Result<Vec<Slot>, ExprError> {
    if stack.len() < n {
        return Err(ExprError::MissingOperand(what.to_string()));
    }
    Ok(stack.split_off(stack.len() - n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(src: &str) -> String {
        compile(src).unwrap().to_string()
    }

    #[test]
    fn simple_product() {
        assert_eq!(rendered("2*param.cutoff"), "2 param.cutoff *");
    }

    #[test]
    fn precedence_and_left_associativity() {
        assert_eq!(rendered("1+2*3"), "1 2 3 * +");
        assert_eq!(rendered("8-4-2"), "8 4 - 2 -");
        assert_eq!(rendered("8/4*2"), "8 4 / 2 *");
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(rendered("(1+2)*3"), "1 2 + 3 *");
    }

    #[test]
    fn functions_follow_their_arguments() {
        assert_eq!(
            rendered("log(param.cutoff)+exp(param.resonance)"),
            "param.cutoff log param.resonance exp +"
        );
        assert_eq!(
            rendered("map(param.cutoff, 0, 1)"),
            "param.cutoff 0 1 map"
        );
    }

    #[test]
    fn commas_flush_operators_inside_arguments() {
        assert_eq!(rendered("random(1, 2) * 3"), "1 2 random 3 *");
        assert_eq!(
            rendered("map(param.x, 100+1, 2*3)"),
            "param.x 100 1 + 2 3 * map"
        );
    }

    #[test]
    fn leading_minus_folds_into_literal() {
        assert_eq!(rendered("-1200"), "-1200");
    }

    #[test]
    fn minus_after_operator_or_paren_folds() {
        assert_eq!(rendered("2*-4"), "2 -4 *");
        assert_eq!(rendered("(-3+1)"), "-3 1 +");
        assert_eq!(rendered("map(param.x, -1, 1)"), "param.x -1 1 map");
    }

    #[test]
    fn binary_minus_is_kept() {
        assert_eq!(rendered("param.x-1"), "param.x 1 -");
    }

    #[test]
    fn whitespace_is_ignored() {
        assert_eq!(rendered("  2 *  param.pitch "), "2 param.pitch *");
    }

    #[test]
    fn unbalanced_parens_are_errors() {
        assert_eq!(compile("(1+2"), Err(ExprError::UnbalancedParens));
        assert_eq!(compile("1+2)"), Err(ExprError::UnbalancedParens));
    }

    #[test]
    fn arity_errors() {
        assert!(matches!(compile("1+"), Err(ExprError::MissingOperand(_))));
        assert!(matches!(compile("map(param.x, 1)"), Err(ExprError::MissingOperand(_))));
        assert_eq!(compile("1 2"), Err(ExprError::UnknownToken("1 2".into())));
    }

    #[test]
    fn random_requires_literals() {
        assert_eq!(compile("random(param.x, 2)"), Err(ExprError::RandomArguments));
        assert!(compile("random(-1, 1)").is_ok());
    }

    #[test]
    fn map_requires_param_source() {
        assert_eq!(compile("map(3, 0, 1)"), Err(ExprError::MapSource));
    }

    #[test]
    fn unknown_words_are_rejected() {
        assert_eq!(compile("sin(1)"), Err(ExprError::UnknownToken("sin".into())));
        assert_eq!(
            compile("param.9x"),
            Err(ExprError::UnknownToken("param.9x".into()))
        );
    }

    #[test]
    fn non_finite_literals_are_rejected() {
        for word in ["nan", "inf", "infinity", "NaN"] {
            assert_eq!(
                compile(&format!("random({word}, 1)")),
                Err(ExprError::UnknownToken(word.into()))
            );
        }
        assert_eq!(compile("inf * 2"), Err(ExprError::UnknownToken("inf".into())));
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(compile("   "), Err(ExprError::Empty));
        assert_eq!(compile("()"), Err(ExprError::Empty));
    }
}
