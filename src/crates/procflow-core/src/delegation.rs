//! Pluggable evaluation and decision strategies
//!
//! Expressions, scripts and decision handlers are injected through the traits
//! in this module. Their results are the closed [`EvalValue`] variant so the
//! engine never has to inspect host-specific types.

use crate::context::ExecutionContext;
use crate::error::{ProcessError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Result of an expression or script output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalValue {
    Null,
    Bool(bool),
    String(String),
    Collection(Vec<String>),
}

/// Shape the caller expects from an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Any,
    Boolean,
    String,
    Collection,
}

impl EvalValue {
    /// Convert a variable value
    ///
    /// Numbers and objects become their JSON text; array elements are
    /// stringified the same way.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Collection(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            other => Self::String(other.to_string()),
        }
    }

    /// Truthiness used for conditions
    pub fn is_true(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::String(s) => s == "true",
            Self::Collection(items) => !items.is_empty(),
        }
    }

    /// The transition name this value designates, if any
    pub fn as_transition_name(&self) -> Option<String> {
        match self {
            Self::Null | Self::Collection(_) => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::String(s) => Some(s.clone()),
        }
    }

    /// Coerce to the expected shape
    pub fn coerce(self, expected: ExpectedType) -> Result<Self> {
        match (expected, self) {
            (ExpectedType::Any, value) => Ok(value),
            (ExpectedType::Boolean, Self::Null) => Ok(Self::Bool(false)),
            (ExpectedType::Boolean, Self::Bool(b)) => Ok(Self::Bool(b)),
            (ExpectedType::Boolean, Self::String(s)) => match s.as_str() {
                "true" => Ok(Self::Bool(true)),
                "false" => Ok(Self::Bool(false)),
                _ => Err(ProcessError::evaluation(format!(
                    "expected a boolean, got string '{}'",
                    s
                ))),
            },
            (ExpectedType::String, Self::Bool(b)) => Ok(Self::String(b.to_string())),
            (ExpectedType::String, value @ (Self::Null | Self::String(_))) => Ok(value),
            (ExpectedType::Collection, Self::String(s)) => Ok(Self::Collection(vec![s])),
            (ExpectedType::Collection, value @ (Self::Null | Self::Collection(_))) => Ok(value),
            (expected, value) => Err(ProcessError::evaluation(format!(
                "expected {:?}, got {:?}",
                expected, value
            ))),
        }
    }
}

/// Expression language used for conditions and decision expressions
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        expression: &str,
        ctx: &ExecutionContext<'_>,
        expected: ExpectedType,
    ) -> Result<EvalValue>;
}

/// Script producing named outputs
///
/// Fork and join scripts must produce exactly one output.
pub trait Script: Send + Sync {
    fn eval(&self, ctx: &ExecutionContext<'_>) -> Result<HashMap<String, EvalValue>>;
}

/// Decision handler naming the transition a decision node leaves over
pub trait DecisionHandler: Send + Sync {
    fn decide(&self, ctx: &mut ExecutionContext<'_>) -> Result<String>;
}

/// Picks the next transition name for an interleave start
pub trait TransitionSelector: Send + Sync {
    fn select(&self, names: &[String]) -> Option<String>;
}

/// Always picks the first remaining name
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSelector;

impl TransitionSelector for FirstSelector {
    fn select(&self, names: &[String]) -> Option<String> {
        names.first().cloned()
    }
}

/// Picks a remaining name uniformly at random
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl TransitionSelector for RandomSelector {
    fn select(&self, names: &[String]) -> Option<String> {
        if names.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..names.len());
        names.get(index).cloned()
    }
}

struct FnScript<F>(F);

impl<F> Script for FnScript<F>
where
    F: Fn(&ExecutionContext<'_>) -> Result<HashMap<String, EvalValue>> + Send + Sync,
{
    fn eval(&self, ctx: &ExecutionContext<'_>) -> Result<HashMap<String, EvalValue>> {
        (self.0)(ctx)
    }
}

/// Wrap a closure as a [`Script`]
pub fn script_fn<F>(f: F) -> impl Script
where
    F: Fn(&ExecutionContext<'_>) -> Result<HashMap<String, EvalValue>> + Send + Sync + 'static,
{
    FnScript(f)
}

struct FnDecision<F>(F);

impl<F> DecisionHandler for FnDecision<F>
where
    F: Fn(&mut ExecutionContext<'_>) -> Result<String> + Send + Sync,
{
    fn decide(&self, ctx: &mut ExecutionContext<'_>) -> Result<String> {
        (self.0)(ctx)
    }
}

/// Wrap a closure as a [`DecisionHandler`]
pub fn decision_fn<F>(f: F) -> impl DecisionHandler
where
    F: Fn(&mut ExecutionContext<'_>) -> Result<String> + Send + Sync + 'static,
{
    FnDecision(f)
}

/// Single output of a script, `Null` when it produced none
pub(crate) fn single_output(outputs: HashMap<String, EvalValue>) -> Result<EvalValue> {
    if outputs.len() > 1 {
        return Err(ProcessError::evaluation(format!(
            "script produced {} outputs, expected at most one",
            outputs.len()
        )));
    }
    Ok(outputs.into_values().next().unwrap_or(EvalValue::Null))
}
