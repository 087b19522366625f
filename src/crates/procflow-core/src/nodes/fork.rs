//! Fork: one child token per selected transition

use crate::context::ExecutionContext;
use crate::definition::ProcessDefinition;
use crate::delegation::{single_output, EvalValue};
use crate::engine::{self, Flow};
use crate::error::{ProcessError, Result};
use crate::node::{ForkConfig, NodeId};
use crate::transition::TransitionId;

pub(super) fn execute(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &ForkConfig,
) -> Result<Flow> {
    let transitions = fork_transitions(ctx, definition, node, config)?;

    let parent = ctx.token_id();
    let reason = engine::fork_lock_reason(&ctx.instance.tokens, parent);
    ctx.token_mut().lock(reason)?;
    let round = ctx.instance.tokens.begin_fork_round(parent)?;

    let mut children = Vec::with_capacity(transitions.len());
    for transition in transitions {
        let name = definition.transition(transition).name();
        let child = ctx.instance.tokens.create_child(parent, name)?;
        children.push((child, transition));
    }
    tracing::debug!(
        token = %ctx.token_name(),
        node = %definition.full_name(node),
        children = children.len(),
        round,
        "Forking"
    );

    for (child, transition) in children {
        engine::leave(&mut ctx.for_token(child), node, transition)?;
    }
    Ok(Flow::Wait)
}

fn fork_transitions(
    ctx: &ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &ForkConfig,
) -> Result<Vec<TransitionId>> {
    let Some(script) = &config.script else {
        return Ok(definition.node(node).leaving_transitions().to_vec());
    };
    match single_output(script.eval(ctx)?)? {
        EvalValue::Collection(names) => names
            .iter()
            .map(|name| {
                definition.leaving_transition(node, name).ok_or_else(|| {
                    ProcessError::illegal_state(format!(
                        "fork '{}' has no leaving transition named '{}'",
                        definition.full_name(node),
                        name
                    ))
                })
            })
            .collect(),
        other => Err(ProcessError::evaluation(format!(
            "fork script of '{}' must produce a collection of transition names, got {:?}",
            definition.full_name(node),
            other
        ))),
    }
}
