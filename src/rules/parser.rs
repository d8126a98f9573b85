// src/rules/parser.rs

//! Recursive-descent parser producing a boolean expression tree.
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := primary ( "&&" primary )*
//! primary := "(" expr ")" | clause
//! clause  := operand [ ("==" | "!=") operand | ("=~" | "!~") pattern ]
//! ```

use regex::{Regex, RegexBuilder};

use crate::errors::{LocalCiError, Result};
use crate::rules::lexer::{split_regex_literal, Token};

#[derive(Debug, Clone)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Clause(Clause),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Variable { name: String, value: Option<String> },
    Literal(String),
    Null,
}

impl Operand {
    /// Value of the operand; `None` is the null sentinel.
    pub fn value(&self) -> Option<&str> {
        match self {
            Operand::Variable { value, .. } => value.as_deref(),
            Operand::Literal(s) => Some(s.as_str()),
            Operand::Null => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Clause {
    /// Bare operand: true iff it has a non-empty value.
    Truthy(Operand),
    Equals {
        left: Operand,
        right: Operand,
        negate: bool,
    },
    /// `=~` / `!~`. `pattern` is `None` when the right side is an undefined
    /// variable, which never matches.
    Matches {
        left: Operand,
        pattern: Option<Regex>,
        negate: bool,
    },
}

pub fn parse(tokens: Vec<Token>, source: &str) -> Result<Expr> {
    if tokens.is_empty() {
        return Err(LocalCiError::rule(format!("empty expression `{source}`")));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
    };
    let expr = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(parser.error(&format!("unexpected token {token:?}")));
    }

    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, msg: &str) -> LocalCiError {
        LocalCiError::rule(format!("{msg} in expression `{}`", self.source))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_primary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            match self.next() {
                Some(Token::RParen) => return Ok(inner),
                _ => return Err(self.error("missing ')'")),
            }
        }
        self.parse_clause().map(Expr::Clause)
    }

    fn parse_clause(&mut self) -> Result<Clause> {
        let left = self.parse_operand()?;

        match self.peek() {
            Some(Token::Eq) | Some(Token::NotEq) => {
                let negate = self.next() == Some(Token::NotEq);
                let right = self.parse_operand()?;
                Ok(Clause::Equals {
                    left,
                    right,
                    negate,
                })
            }
            Some(Token::Match) | Some(Token::NotMatch) => {
                let negate = self.next() == Some(Token::NotMatch);
                let pattern = self.parse_pattern()?;
                Ok(Clause::Matches {
                    left,
                    pattern,
                    negate,
                })
            }
            _ => Ok(Clause::Truthy(left)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.next() {
            Some(Token::Variable { name, value }) => Ok(Operand::Variable { name, value }),
            Some(Token::Str(s)) => Ok(Operand::Literal(s)),
            Some(Token::Null) => Ok(Operand::Null),
            Some(other) => Err(self.error(&format!("expected an operand, found {other:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_pattern(&mut self) -> Result<Option<Regex>> {
        match self.next() {
            Some(Token::Regex { pattern, flags }) => self.compile(&pattern, &flags).map(Some),
            Some(Token::Str(s)) => match split_regex_literal(&s) {
                Some((pattern, flags)) => self.compile(&pattern, &flags).map(Some),
                None => Err(self.error(&format!(
                    "the right side of =~ / !~ must be a /regex/, got the string '{s}'"
                ))),
            },
            Some(Token::Variable { name, value }) => match value {
                None => Ok(None),
                Some(v) => match split_regex_literal(&v) {
                    Some((pattern, flags)) => self.compile(&pattern, &flags).map(Some),
                    None => Err(self.error(&format!(
                        "variable ${name} used as a pattern does not hold a /regex/ (value '{v}')"
                    ))),
                },
            },
            Some(other) => Err(self.error(&format!("expected a /regex/, found {other:?}"))),
            None => Err(self.error("expected a /regex/ after =~ / !~")),
        }
    }

    fn compile(&self, pattern: &str, flags: &str) -> Result<Regex> {
        let mut builder = RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                // `g` has no meaning for a boolean match.
                'g' => {}
                other => {
                    return Err(self.error(&format!("unsupported regex flag '{other}'")));
                }
            }
        }
        builder
            .build()
            .map_err(|e| self.error(&format!("invalid regex /{pattern}/: {e}")))
    }
}
