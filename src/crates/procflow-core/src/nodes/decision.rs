//! Decision: picks exactly one leaving transition

use crate::context::ExecutionContext;
use crate::definition::ProcessDefinition;
use crate::delegation::ExpectedType;
use crate::engine::Flow;
use crate::error::{ProcessError, Result};
use crate::node::{DecisionConfig, NodeId};
use crate::transition::TransitionId;

enum Selection {
    Named(String),
    Transition(TransitionId),
}

pub(super) fn execute(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &DecisionConfig,
) -> Result<Flow> {
    let transition = match select(ctx, definition, node, config)? {
        Some(Selection::Named(name)) => {
            definition.leaving_transition(node, &name).ok_or_else(|| {
                ProcessError::illegal_state(format!(
                    "decision '{}' selected unknown transition '{}'",
                    definition.full_name(node),
                    name
                ))
            })?
        }
        Some(Selection::Transition(transition)) => transition,
        None => definition.default_leaving_transition(node).ok_or_else(|| {
            ProcessError::configuration(format!(
                "decision '{}' selected no transition and has no default",
                definition.full_name(node)
            ))
        })?,
    };
    tracing::debug!(
        token = %ctx.token_name(),
        node = %definition.full_name(node),
        transition = definition.transition(transition).name().unwrap_or(""),
        "Decision taken"
    );
    Ok(Flow::Leave(transition))
}

fn select(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &DecisionConfig,
) -> Result<Option<Selection>> {
    if let Some(handler) = &config.handler {
        return handler.decide(ctx).map(|name| Some(Selection::Named(name)));
    }
    if let Some(expression) = &config.expression {
        let value = ctx.evaluate(expression, ExpectedType::String)?;
        return Ok(value.as_transition_name().map(Selection::Named));
    }
    for condition in &config.conditions {
        if ctx.evaluate(&condition.expression, ExpectedType::Boolean)?.is_true() {
            return Ok(Some(Selection::Named(condition.transition.clone())));
        }
    }
    for transition in definition.node(node).leaving_transitions() {
        if let Some(condition) = definition.transition(*transition).condition() {
            if ctx.evaluate(condition, ExpectedType::Boolean)?.is_true() {
                return Ok(Some(Selection::Transition(*transition)));
            }
        }
    }
    Ok(None)
}
