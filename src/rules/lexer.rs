// src/rules/lexer.rs

//! Tokenizer for `rules:if` expressions.
//!
//! Variables are resolved while lexing: a `$NAME`, `${NAME}` or nested
//! `${URL_${ENV}}` token carries the variable's value, or `None` when it is
//! undefined.

use crate::errors::{LocalCiError, Result};
use crate::variables::{expand_text, find_closing_brace, is_name_char, read_name, Environment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Variable { name: String, value: Option<String> },
    Str(String),
    Regex { pattern: String, flags: String },
    Null,
    Eq,
    NotEq,
    Match,
    NotMatch,
    And,
    Or,
    LParen,
    RParen,
}

pub fn tokenize(input: &str, vars: &Environment) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let expects_pattern = matches!(tokens.last(), Some(Token::Match | Token::NotMatch));

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'~') => {
                tokens.push(Token::Match);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'~') => {
                tokens.push(Token::NotMatch);
                i += 2;
            }
            '$' => {
                let (token, next) = lex_variable(&chars, i, input, vars)?;
                tokens.push(token);
                i = next;
            }
            '"' | '\'' => {
                let (text, next) = lex_quoted(&chars, i, input)?;
                tokens.push(Token::Str(text));
                i = next;
            }
            '/' if expects_pattern => {
                let (token, next) = lex_regex(&chars, i, input)?;
                tokens.push(token);
                i = next;
            }
            c if c.is_ascii_alphabetic() => {
                let (word, next) = read_name(&chars, i);
                if word == "null" {
                    tokens.push(Token::Null);
                    i = next;
                } else {
                    return Err(LocalCiError::rule(format!(
                        "unexpected word '{word}' in expression `{input}`"
                    )));
                }
            }
            other => {
                return Err(LocalCiError::rule(format!(
                    "unexpected character '{other}' at offset {i} in expression `{input}`"
                )));
            }
        }
    }

    Ok(tokens)
}

fn lex_variable(
    chars: &[char],
    start: usize,
    input: &str,
    vars: &Environment,
) -> Result<(Token, usize)> {
    let (name, next) = match chars.get(start + 1) {
        Some('{') => {
            let end = find_closing_brace(chars, start + 2).ok_or_else(|| {
                LocalCiError::rule(format!("unterminated `${{` in expression `{input}`"))
            })?;
            let inner: String = chars[start + 2..end].iter().collect();
            (expand_text(&inner, vars), end + 1)
        }
        Some(c) if is_name_char(*c) => read_name(chars, start + 1),
        _ => {
            return Err(LocalCiError::rule(format!(
                "expected a variable name after '$' in expression `{input}`"
            )));
        }
    };

    if name.is_empty() {
        return Err(LocalCiError::rule(format!(
            "empty variable name in expression `{input}`"
        )));
    }

    let value = vars.get(&name).cloned();
    Ok((Token::Variable { name, value }, next))
}

fn lex_quoted(chars: &[char], start: usize, input: &str) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if matches!(chars.get(i + 1), Some(&c) if c == quote || c == '\\') => {
                text.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(LocalCiError::rule(format!(
        "unterminated string literal in expression `{input}`"
    )))
}

fn lex_regex(chars: &[char], start: usize, input: &str) -> Result<(Token, usize)> {
    let mut pattern = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if chars.get(i + 1) == Some(&'/') => {
                pattern.push('/');
                i += 2;
            }
            '\\' if i + 1 < chars.len() => {
                pattern.push('\\');
                pattern.push(chars[i + 1]);
                i += 2;
            }
            '/' => {
                let mut end = i + 1;
                while end < chars.len() && chars[end].is_ascii_alphabetic() {
                    end += 1;
                }
                let flags = chars[i + 1..end].iter().collect();
                return Ok((Token::Regex { pattern, flags }, end));
            }
            c => {
                pattern.push(c);
                i += 1;
            }
        }
    }

    Err(LocalCiError::rule(format!(
        "unterminated regex literal in expression `{input}`"
    )))
}

/// Split a `/pattern/flags` string into its parts.
///
/// Used for quoted patterns and for variables holding a pattern.
pub fn split_regex_literal(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let body = text.strip_prefix('/')?;
    let last = body.rfind('/')?;
    let flags = &body[last + 1..];
    if !flags.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((body[..last].replace("\\/", "/"), flags.to_string()))
}
