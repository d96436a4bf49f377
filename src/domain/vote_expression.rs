//! Restricted boolean language for custom signal aggregation.
//!
//! ```text
//! expr    := and_expr ( "OR" and_expr )*
//! and_expr:= primary ( "AND" primary )*
//! primary := NAME "==" VALUE | "(" expr ")"
//! VALUE   := "1" | "0" | "-1"
//! ```
//!
//! `NAME` refers to a contributing strategy; the test holds on a date when
//! that strategy's position equals `VALUE`. The same token and nesting limits
//! as condition expressions apply. Names are resolved at evaluation time so a
//! bad reference only affects the dates it is evaluated on.

use crate::domain::error::ParseError;
use crate::domain::expression_parser::{MAX_DEPTH, MAX_TOKENS};
use crate::domain::position::Position;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteExpr {
    Test { strategy: String, value: Position },
    And(Box<VoteExpr>, Box<VoteExpr>),
    Or(Box<VoteExpr>, Box<VoteExpr>),
}

impl VoteExpr {
    /// Evaluate against one date's positions. Fails with the first strategy
    /// name that has no position.
    pub fn eval(&self, positions: &HashMap<&str, Position>) -> Result<bool, String> {
        match self {
            VoteExpr::Test { strategy, value } => positions
                .get(strategy.as_str())
                .map(|p| p == value)
                .ok_or_else(|| strategy.clone()),
            VoteExpr::And(l, r) => Ok(l.eval(positions)? && r.eval(positions)?),
            VoteExpr::Or(l, r) => Ok(l.eval(positions)? || r.eval(positions)?),
        }
    }

    pub fn strategies(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            VoteExpr::Test { strategy, .. } => {
                out.insert(strategy.as_str());
            }
            VoteExpr::And(l, r) | VoteExpr::Or(l, r) => {
                l.collect(out);
                r.collect(out);
            }
        }
    }
}

impl fmt::Display for VoteExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteExpr::Test { strategy, value } => write!(f, "{} == {}", strategy, value.as_i8()),
            VoteExpr::And(l, r) => write!(f, "({} AND {})", l, r),
            VoteExpr::Or(l, r) => write!(f, "({} OR {})", l, r),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'a> {
    Name(&'a str),
    Value(Position),
    EqEq,
    And,
    Or,
    LParen,
    RParen,
}

impl Tok<'_> {
    fn describe(&self) -> String {
        match self {
            Tok::Name(n) => (*n).to_string(),
            Tok::Value(p) => p.as_i8().to_string(),
            Tok::EqEq => "==".into(),
            Tok::And => "AND".into(),
            Tok::Or => "OR".into(),
            Tok::LParen => "(".into(),
            Tok::RParen => ")".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Tok<'_>, usize)>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let ch = bytes[i] as char;
        match ch {
            c if c.is_ascii_whitespace() => i += 1,
            '(' => {
                tokens.push((Tok::LParen, i));
                i += 1;
            }
            ')' => {
                tokens.push((Tok::RParen, i));
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push((Tok::EqEq, i));
                    i += 2;
                } else {
                    return Err(ParseError::new("expected '=='", i));
                }
            }
            '-' | '0'..='9' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &input[start..i];
                let value = text
                    .parse::<i8>()
                    .ok()
                    .and_then(|v| Position::try_from(v).ok())
                    .ok_or_else(|| {
                        ParseError::new(
                            format!("invalid position value '{}' (expected 1, 0 or -1)", text),
                            start,
                        )
                    })?;
                tokens.push((Tok::Value(value), start));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let tok = match &input[start..i] {
                    "AND" => Tok::And,
                    "OR" => Tok::Or,
                    name => Tok::Name(name),
                };
                tokens.push((tok, start));
            }
            _ => {
                let found = input[i..].chars().next().unwrap_or(ch);
                return Err(ParseError::new(
                    format!("unexpected character '{}'", found),
                    i,
                ));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<(Tok<'a>, usize)>,
    pos: usize,
    input_len: usize,
}

impl<'a> Parser<'a> {
    fn advance(&mut self) -> Option<(Tok<'a>, usize)> {
        let tok = self.tokens.get(self.pos).copied()?;
        self.pos += 1;
        Some(tok)
    }

    fn consume(&mut self, want: Tok<'a>) -> bool {
        if self.tokens.get(self.pos).is_some_and(|(t, _)| *t == want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str, found: Option<(Tok<'_>, usize)>) -> ParseError {
        match found {
            Some((tok, at)) => ParseError::new(
                format!("expected {}, found '{}'", expected, tok.describe()),
                at,
            ),
            None => ParseError::new(
                format!("expected {}, found end of input", expected),
                self.input_len,
            ),
        }
    }

    fn parse_or(&mut self) -> Result<VoteExpr, ParseError> {
        let mut left = self.parse_and()?;
        while self.consume(Tok::Or) {
            let right = self.parse_and()?;
            left = VoteExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<VoteExpr, ParseError> {
        let mut left = self.parse_primary()?;
        while self.consume(Tok::And) {
            let right = self.parse_primary()?;
            left = VoteExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<VoteExpr, ParseError> {
        match self.advance() {
            Some((Tok::Name(name), _)) => {
                let eq = self.advance();
                if !matches!(eq, Some((Tok::EqEq, _))) {
                    return Err(self.unexpected("'=='", eq));
                }
                match self.advance() {
                    Some((Tok::Value(value), _)) => Ok(VoteExpr::Test {
                        strategy: name.to_string(),
                        value,
                    }),
                    other => Err(self.unexpected("1, 0 or -1", other)),
                }
            }
            Some((Tok::LParen, _)) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some((Tok::RParen, _)) => Ok(inner),
                    other => Err(self.unexpected("')'", other)),
                }
            }
            other => Err(self.unexpected("strategy test or '('", other)),
        }
    }
}

pub fn parse(input: &str) -> Result<VoteExpr, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::new("expression is empty", 0));
    }
    let tokens = tokenize(input)?;
    if tokens.len() > MAX_TOKENS {
        return Err(ParseError::new(
            format!(
                "expression too complex: {} tokens (maximum {})",
                tokens.len(),
                MAX_TOKENS
            ),
            tokens[MAX_TOKENS].1,
        ));
    }
    let mut depth = 0usize;
    for (tok, at) in &tokens {
        match tok {
            Tok::LParen => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(ParseError::new(
                        format!("expression nested too deeply (maximum depth {})", MAX_DEPTH),
                        *at,
                    ));
                }
            }
            Tok::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        input_len: input.len(),
    };
    let expr = parser.parse_or()?;
    if let Some((tok, at)) = parser.advance() {
        return Err(ParseError::new(
            format!("unexpected '{}' after expression", tok.describe()),
            at,
        ));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes<'a>(pairs: &[(&'a str, i8)]) -> HashMap<&'a str, Position> {
        pairs
            .iter()
            .map(|&(n, v)| (n, Position::try_from(v).unwrap()))
            .collect()
    }

    #[test]
    fn parse_equality_tests() {
        let e = parse("trend == 1 AND (mr == -1 OR mr == 0)").unwrap();
        assert_eq!(e.to_string(), "(trend == 1 AND (mr == -1 OR mr == 0))");
        let names: Vec<&str> = e.strategies().into_iter().collect();
        assert_eq!(names, vec!["mr", "trend"]);
    }

    #[test]
    fn eval_against_positions() {
        let e = parse("a == 1 OR b == -1").unwrap();
        assert_eq!(e.eval(&votes(&[("a", 1), ("b", 0)])), Ok(true));
        assert_eq!(e.eval(&votes(&[("a", 0), ("b", -1)])), Ok(true));
        assert_eq!(e.eval(&votes(&[("a", 0), ("b", 0)])), Ok(false));
    }

    #[test]
    fn eval_unknown_strategy_fails() {
        let e = parse("a == 1 AND ghost == 1").unwrap();
        assert_eq!(e.eval(&votes(&[("a", 1)])), Err("ghost".to_string()));
    }

    #[test]
    fn rejects_out_of_range_value() {
        let err = parse("a == 2").unwrap_err();
        assert_eq!(err.position, 5);
        let err = parse("a == -2").unwrap_err();
        assert_eq!(err.position, 5);
    }

    #[test]
    fn rejects_single_equals_and_missing_operator() {
        assert_eq!(parse("a = 1").unwrap_err().position, 2);
        assert_eq!(parse("a 1").unwrap_err().position, 2);
        assert_eq!(parse("a ==").unwrap_err().position, 4);
    }

    #[test]
    fn rejects_code_like_input() {
        assert!(parse("a == 1; drop()").is_err());
        assert!(parse("__import__('os')").is_err());
        assert_eq!(parse("").unwrap_err().position, 0);
    }

    #[test]
    fn depth_limit_shared_with_conditions() {
        let ok = format!("{}a == 1{}", "(".repeat(6), ")".repeat(6));
        assert!(parse(&ok).is_ok());
        let deep = format!("{}a == 1{}", "(".repeat(7), ")".repeat(7));
        assert!(parse(&deep).is_err());
    }
}
