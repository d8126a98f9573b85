// src/rules/eval.rs

use crate::errors::Result;
use crate::rules::lexer::tokenize;
use crate::rules::parser::{parse, Clause, Expr};
use crate::variables::Environment;

/// Evaluate a `rules:if` expression against `variables`.
pub fn evaluate(expr: &str, variables: &Environment) -> Result<bool> {
    let tokens = tokenize(expr, variables)?;
    let tree = parse(tokens, expr)?;
    Ok(eval_expr(&tree))
}

pub fn eval_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Or(left, right) => eval_expr(left) || eval_expr(right),
        Expr::And(left, right) => eval_expr(left) && eval_expr(right),
        Expr::Clause(clause) => eval_clause(clause),
    }
}

fn eval_clause(clause: &Clause) -> bool {
    match clause {
        Clause::Truthy(operand) => operand.value().is_some_and(|v| !v.is_empty()),
        Clause::Equals {
            left,
            right,
            negate,
        } => (left.value() == right.value()) != *negate,
        Clause::Matches {
            left,
            pattern,
            negate,
        } => {
            let matched = match (left.value(), pattern) {
                (Some(value), Some(re)) => re.is_match(value),
                _ => false,
            };
            matched != *negate
        }
    }
}
