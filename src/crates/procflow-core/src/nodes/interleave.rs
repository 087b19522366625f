//! Interleaved execution of a node's branches, one at a time
//!
//! The start node keeps the branch names still to run in a token-local
//! variable; the end node loops `back` until that list is exhausted and then
//! leaves over `done`.

use crate::context::ExecutionContext;
use crate::definition::ProcessDefinition;
use crate::engine::Flow;
use crate::error::{ProcessError, Result};
use crate::node::{InterleaveConfig, NodeId, NodeKind, DEFAULT_INTERLEAVE_VARIABLE};
use crate::transition::TransitionId;
use serde_json::Value;

pub(super) fn start(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &InterleaveConfig,
) -> Result<Flow> {
    let mut remaining = remaining_names(ctx, &config.variable);
    if remaining.is_empty() {
        remaining = definition
            .node(node)
            .leaving_transitions()
            .iter()
            .filter_map(|t| definition.transition(*t).name().map(str::to_string))
            .collect();
    }

    let selected = config.selector.select(&remaining).ok_or_else(|| {
        ProcessError::configuration(format!(
            "interleave start '{}' has no named transitions",
            definition.full_name(node)
        ))
    })?;
    if let Some(position) = remaining.iter().position(|name| *name == selected) {
        remaining.remove(position);
    }
    let transition = definition.leaving_transition(node, &selected).ok_or_else(|| {
        ProcessError::illegal_state(format!(
            "interleave start '{}' selected unknown transition '{}'",
            definition.full_name(node),
            selected
        ))
    })?;

    tracing::debug!(
        token = %ctx.token_name(),
        node = %definition.full_name(node),
        selected = %selected,
        remaining = remaining.len(),
        "Interleave branch selected"
    );
    ctx.set_local_variable(&config.variable, Value::from(remaining));
    Ok(Flow::Leave(transition))
}

pub(super) fn end(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
) -> Result<Flow> {
    let back = required_transition(definition, node, "back")?;
    let done = required_transition(definition, node, "done")?;

    let loop_start = definition.first_leaf(definition.transition(back).to());
    let variable = match definition.node(loop_start).kind() {
        NodeKind::InterleaveStart(config) => config.variable.clone(),
        _ => DEFAULT_INTERLEAVE_VARIABLE.to_string(),
    };

    if remaining_names(ctx, &variable).is_empty() {
        let token = ctx.token_id();
        ctx.instance.variables.remove(token, &variable);
        Ok(Flow::Leave(done))
    } else {
        Ok(Flow::Leave(back))
    }
}

fn remaining_names(ctx: &ExecutionContext<'_>, variable: &str) -> Vec<String> {
    match ctx.instance.variables.get(ctx.token_id(), variable) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn required_transition(
    definition: &ProcessDefinition,
    node: NodeId,
    name: &str,
) -> Result<TransitionId> {
    definition.leaving_transition(node, name).ok_or_else(|| {
        ProcessError::configuration(format!(
            "interleave end '{}' needs a '{}' transition",
            definition.full_name(node),
            name
        ))
    })
}
