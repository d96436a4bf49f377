//! Expression parser and validator.
//!
//! Grammar (AND binds tighter than OR, both left-associative):
//!
//! ```text
//! expr    := and_expr ( "OR" and_expr )*
//! and_expr:= primary ( "AND" primary )*
//! primary := IDENT | "(" expr ")"
//! ```
//!
//! Identifiers are `[A-Za-z_][A-Za-z0-9_]*` and must name an available
//! condition. Operators are case-sensitive. Any other character is a lexer
//! error. Expressions are capped at [`MAX_TOKENS`] tokens and
//! [`MAX_DEPTH`] levels of parenthesis nesting.

use crate::domain::error::ParseError;
use crate::domain::expression::Expr;

pub const MAX_TOKENS: usize = 50;
pub const MAX_DEPTH: usize = 6;

/// Outcome of [`validate`], shaped for display next to an input field.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub valid: bool,
    pub error_message: Option<String>,
    pub error_position: Option<usize>,
}

impl Validation {
    fn ok() -> Self {
        Self {
            valid: true,
            error_message: None,
            error_position: None,
        }
    }

    fn from_error(err: ParseError) -> Self {
        Self {
            valid: false,
            error_message: Some(err.message),
            error_position: Some(err.position),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    And,
    Or,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    position: usize,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '(' || ch == ')' {
            chars.next();
            let kind = if ch == '(' {
                TokenKind::LParen
            } else {
                TokenKind::RParen
            };
            tokens.push(Token {
                kind,
                text: &input[pos..pos + 1],
                position: pos,
            });
            continue;
        }
        if is_ident_start(ch) {
            let mut end = pos;
            while let Some(&(i, c)) = chars.peek() {
                if is_ident_continue(c) {
                    end = i + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let text = &input[pos..end];
            let kind = match text {
                "AND" => TokenKind::And,
                "OR" => TokenKind::Or,
                _ => TokenKind::Ident,
            };
            tokens.push(Token {
                kind,
                text,
                position: pos,
            });
            continue;
        }
        return Err(ParseError::new(
            format!("unexpected character '{}'", ch),
            pos,
        ));
    }

    Ok(tokens)
}

fn check_limits(tokens: &[Token<'_>]) -> Result<(), ParseError> {
    if tokens.len() > MAX_TOKENS {
        return Err(ParseError::new(
            format!(
                "expression too complex: {} tokens (maximum {})",
                tokens.len(),
                MAX_TOKENS
            ),
            tokens[MAX_TOKENS].position,
        ));
    }

    let mut depth = 0usize;
    for tok in tokens {
        match tok.kind {
            TokenKind::LParen => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(ParseError::new(
                        format!("expression nested too deeply (maximum depth {})", MAX_DEPTH),
                        tok.position,
                    ));
                }
            }
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    input_len: usize,
    available: &'a [&'a str],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().is_some_and(|t| t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_rparen(&mut self) -> Result<(), ParseError> {
        match self.advance() {
            Some(tok) if tok.kind == TokenKind::RParen => Ok(()),
            Some(tok) => Err(ParseError::new(
                format!("expected ')', found '{}'", tok.text),
                tok.position,
            )),
            None => Err(ParseError::new(
                "expected ')', found end of input",
                self.input_len,
            )),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.consume(TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_primary()?;
        while self.consume(TokenKind::And) {
            let right = self.parse_primary()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(tok) if tok.kind == TokenKind::Ident => {
                if !self.available.contains(&tok.text) {
                    return Err(ParseError::new(
                        format!("unknown condition '{}'", tok.text),
                        tok.position,
                    ));
                }
                Ok(Expr::condition(tok.text))
            }
            Some(tok) if tok.kind == TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(tok) => Err(ParseError::new(
                format!("expected condition or '(', found '{}'", tok.text),
                tok.position,
            )),
            None => Err(ParseError::new(
                "expected condition or '(', found end of input",
                self.input_len,
            )),
        }
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_or()?;
        if let Some(tok) = self.peek() {
            return Err(ParseError::new(
                format!("unexpected '{}' after expression", tok.text),
                tok.position,
            ));
        }
        Ok(expr)
    }
}

/// Parse `input` into an [`Expr`], rejecting identifiers not in `available`.
pub fn parse(input: &str, available: &[&str]) -> Result<Expr, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::new("expression is empty", 0));
    }
    let tokens = tokenize(input)?;
    check_limits(&tokens)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input_len: input.len(),
        available,
    };
    parser.parse()
}

/// Validate `input` without keeping the tree. Agrees with [`parse`] on every input.
pub fn validate(input: &str, available: &[&str]) -> Validation {
    match parse(input, available) {
        Ok(_) => Validation::ok(),
        Err(e) => Validation::from_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: &[&str] = &["A", "B", "C", "rsi_low", "trend_up"];

    fn nested(depth: usize) -> String {
        format!("{}A{}", "(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn parse_single_condition() {
        assert_eq!(parse("A", NAMES).unwrap(), Expr::condition("A"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = parse("A OR B AND C", NAMES).unwrap();
        assert_eq!(
            e,
            Expr::or(
                Expr::condition("A"),
                Expr::and(Expr::condition("B"), Expr::condition("C"))
            )
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let e = parse("(A OR B) AND C", NAMES).unwrap();
        assert_eq!(e.to_string(), "((A OR B) AND C)");
    }

    #[test]
    fn left_associative_chains() {
        let e = parse("A AND B AND C", NAMES).unwrap();
        assert_eq!(e.to_string(), "((A AND B) AND C)");
    }

    #[test]
    fn whitespace_is_insignificant() {
        let e = parse("  rsi_low\tAND\n(trend_up)  ", NAMES).unwrap();
        assert_eq!(e.to_string(), "(rsi_low AND trend_up)");
    }

    #[test]
    fn empty_is_invalid_at_zero() {
        let v = validate("", NAMES);
        assert!(!v.valid);
        assert_eq!(v.error_position, Some(0));
        let v = validate("   ", NAMES);
        assert!(!v.valid);
        assert_eq!(v.error_position, Some(0));
    }

    #[test]
    fn unknown_identifier_reported_at_offset() {
        let err = parse("A AND missing", NAMES).unwrap_err();
        assert_eq!(err.position, 6);
        assert!(err.message.contains("missing"));
    }

    #[test]
    fn operators_are_case_sensitive() {
        let err = parse("A and B", NAMES).unwrap_err();
        assert_eq!(err.position, 2);
        assert!(err.message.contains("'and'"));
    }

    #[test]
    fn unexpected_character_is_a_lexer_error() {
        let err = parse("A & B", NAMES).unwrap_err();
        assert_eq!(err.position, 2);
        assert!(err.message.contains("unexpected character '&'"));
    }

    #[test]
    fn trailing_tokens_rejected() {
        let err = parse("A B", NAMES).unwrap_err();
        assert_eq!(err.position, 2);
        let err = parse("A)", NAMES).unwrap_err();
        assert_eq!(err.position, 1);
    }

    #[test]
    fn dangling_operator_rejected() {
        let err = parse("A AND", NAMES).unwrap_err();
        assert_eq!(err.position, 5);
        assert!(err.message.contains("end of input"));
        let err = parse("OR A", NAMES).unwrap_err();
        assert_eq!(err.position, 0);
    }

    #[test]
    fn unbalanced_parenthesis_rejected() {
        let err = parse("(A OR B", NAMES).unwrap_err();
        assert_eq!(err.position, 7);
        let err = parse("()", NAMES).unwrap_err();
        assert_eq!(err.position, 1);
    }

    #[test]
    fn depth_six_accepted_seven_rejected() {
        assert!(validate(&nested(6), NAMES).valid);
        let v = validate(&nested(7), NAMES);
        assert!(!v.valid);
        assert_eq!(v.error_position, Some(6));
    }

    #[test]
    fn token_limit() {
        // 25 identifiers + 24 operators = 49 tokens
        let ok = vec!["A"; 25].join(" AND ");
        assert!(validate(&ok, NAMES).valid);
        // 26 + 25 = 51 tokens
        let too_many = vec!["A"; 26].join(" AND ");
        let v = validate(&too_many, NAMES);
        assert!(!v.valid);
        assert!(v.error_message.unwrap().contains("too complex"));
    }

    #[test]
    fn exactly_max_tokens_passes_the_limit() {
        // Well-formed input always has an odd token count, so 50 tokens
        // ends in a dangling operator: rejected by the grammar, not the limit.
        let at_limit = format!("{} AND", vec!["A"; 25].join(" AND "));
        let v = validate(&at_limit, NAMES);
        assert!(!v.valid);
        assert!(!v.error_message.unwrap().contains("too complex"));
        // 50 tokens including a parenthesised group
        let grouped = format!("({}) AND", vec!["A"; 24].join(" AND "));
        let v = validate(&grouped, NAMES);
        assert!(!v.error_message.unwrap().contains("too complex"));
    }

    #[test]
    fn validate_agrees_with_parse() {
        let inputs = [
            "A",
            "A AND",
            "(A OR B) AND C",
            "x",
            "",
            "A # B",
            "((A))",
            "A OR OR B",
        ];
        for input in inputs {
            let v = validate(input, NAMES);
            let p = parse(input, NAMES);
            assert_eq!(v.valid, p.is_ok(), "disagreement on {:?}", input);
            if let Err(e) = p {
                assert_eq!(v.error_position, Some(e.position));
                assert_eq!(v.error_message, Some(e.message));
            }
        }
    }
}
