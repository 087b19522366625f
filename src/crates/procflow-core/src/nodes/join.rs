//! Join: ends arriving children and reactivates their parent
//!
//! Every child may reactivate its parent at most once. Arriving marks the
//! child ineligible before the reactivation rule is checked, so the outcome
//! does not depend on the order siblings arrive in. The rules only look at
//! the children of the parent's latest fork round.

use crate::context::ExecutionContext;
use crate::definition::ProcessDefinition;
use crate::delegation::{single_output, EvalValue};
use crate::engine::{self, Flow};
use crate::error::{ProcessError, Result};
use crate::node::{JoinConfig, NodeId};
use crate::nodes;
use crate::token::TokenId;

pub(super) fn execute(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &JoinConfig,
) -> Result<Flow> {
    let token = ctx.token_id();
    let Some(parent) = ctx.token().parent() else {
        return nodes::default_flow(definition, node);
    };

    let eligible = ctx.token().is_able_to_reactivate_parent();
    engine::end_token(ctx, token, false)?;
    if !eligible {
        return Ok(Flow::Wait);
    }
    ctx.token_mut().able_to_reactivate_parent = false;

    if let Some(lock) = ctx.services().instance_lock.clone() {
        let mode = config
            .parent_lock_mode
            .clone()
            .unwrap_or_else(|| ctx.services().config.default_join_lock_mode.clone());
        lock.acquire(ctx.instance.id(), &mode)?;
    }

    if !should_reactivate(ctx, node, parent, config)? {
        tracing::debug!(
            token = %ctx.token_name(),
            node = %definition.full_name(node),
            "Join waiting for siblings"
        );
        return Ok(Flow::Wait);
    }

    let siblings = ctx.instance.tokens.at(parent).children().to_vec();
    for sibling in siblings {
        ctx.instance.tokens.at_mut(sibling).able_to_reactivate_parent = false;
    }
    let reason = engine::fork_lock_reason(&ctx.instance.tokens, parent);
    ctx.instance.tokens.at_mut(parent).unlock(&reason)?;

    let transition = nodes::default_transition(definition, node)?;
    tracing::debug!(
        parent = %ctx.instance.tokens.full_name(parent),
        node = %definition.full_name(node),
        "Join reactivating parent"
    );
    engine::leave(&mut ctx.for_token(parent), node, transition)?;
    Ok(Flow::Wait)
}

fn should_reactivate(
    ctx: &ExecutionContext<'_>,
    node: NodeId,
    parent: TokenId,
    config: &JoinConfig,
) -> Result<bool> {
    let tokens = &ctx.instance.tokens;
    if config.discriminator {
        return Ok(true);
    }
    if let Some(names) = &config.token_names {
        return all_arrived(ctx, node, parent, names);
    }
    if let Some(script) = &config.script {
        match single_output(script.eval(ctx)?)? {
            EvalValue::Collection(names) => return all_arrived(ctx, node, parent, &names),
            EvalValue::Bool(reactivate) => return Ok(reactivate),
            EvalValue::String(_) => return Ok(true),
            EvalValue::Null => {}
        }
    }
    if let Some(n) = config.n_out_of_m {
        let arrived = tokens
            .current_round(parent)
            .filter(|sibling| tokens.at(*sibling).node() == Some(node))
            .count();
        return Ok(arrived >= n);
    }
    Ok(tokens
        .current_round(parent)
        .all(|sibling| !tokens.at(sibling).is_able_to_reactivate_parent()))
}

/// Every named sibling of the current fork round has arrived
fn all_arrived(
    ctx: &ExecutionContext<'_>,
    node: NodeId,
    parent: TokenId,
    names: &[String],
) -> Result<bool> {
    let tokens = &ctx.instance.tokens;
    let mut arrived = true;
    for name in names {
        let sibling = tokens.round_child_named(parent, name).ok_or_else(|| {
            ProcessError::illegal_state(format!(
                "join '{}' waits for token '{}' which '{}' did not fork",
                ctx.definition().full_name(node),
                name,
                tokens.full_name(parent)
            ))
        })?;
        let sibling = tokens.at(sibling);
        arrived &= sibling.has_ended() && !sibling.is_able_to_reactivate_parent();
    }
    Ok(arrived)
}
