// src/rules/mod.rs

//! Rule predicates: the `rules:if` expression language and first-match rule
//! selection.
//!
//! - [`lexer`] turns an expression into tokens, resolving variables.
//! - [`parser`] builds an [`parser::Expr`] tree.
//! - [`eval`] interprets the tree.

pub mod eval;
pub mod lexer;
pub mod parser;

use tracing::trace;

use crate::config::model::{AllowFailure, RuleSpec};
use crate::errors::Result;
use crate::types::When;
use crate::variables::Environment;

pub use eval::evaluate;

/// Activation decided by [`select_rule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub when: When,
    pub allow_failure: AllowFailure,
    /// `variables:` of the matching rule, to be merged into the job.
    pub variables: Environment,
}

impl RuleOutcome {
    fn never() -> Self {
        Self {
            when: When::Never,
            allow_failure: AllowFailure::Bool(false),
            variables: Environment::new(),
        }
    }
}

/// Pick the first rule whose condition holds.
///
/// A rule without `if` always matches. No match means `when: never`. A
/// matching rule without `when` yields `on_success`; without
/// `allow_failure` it yields `false`, or `true` when the job's static `when`
/// is `manual`.
pub fn select_rule(
    rules: &[RuleSpec],
    variables: &Environment,
    static_when: When,
) -> Result<RuleOutcome> {
    for (idx, rule) in rules.iter().enumerate() {
        let matched = match rule.if_expr.as_deref() {
            Some(expr) => evaluate(expr, variables)?,
            None => true,
        };

        trace!(rule = idx, matched, "evaluated rule");

        if !matched {
            continue;
        }

        let when = rule.when.unwrap_or(When::OnSuccess).normalized();
        let allow_failure = rule
            .allow_failure
            .clone()
            .unwrap_or(AllowFailure::Bool(static_when == When::Manual));
        let variables = rule
            .variables
            .as_ref()
            .map(|vars| {
                vars.iter()
                    .map(|(k, v)| (k.clone(), v.as_text()))
                    .collect()
            })
            .unwrap_or_default();

        return Ok(RuleOutcome {
            when,
            allow_failure,
            variables,
        });
    }

    Ok(RuleOutcome::never())
}
