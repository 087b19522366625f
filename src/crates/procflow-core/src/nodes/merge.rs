use crate::context::ExecutionContext;
use crate::definition::ProcessDefinition;
use crate::engine::{self, Flow};
use crate::error::Result;
use crate::node::{MergeConfig, NodeId};
use crate::nodes;
use crate::token::TokenId;

pub(super) fn execute(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &MergeConfig,
) -> Result<Flow> {
    let transition = nodes::default_transition(definition, node)?;
    let parent = match ctx.token().parent() {
        Some(parent) if config.synchronized => parent,
        _ => return Ok(Flow::Leave(transition)),
    };

    let siblings: Vec<TokenId> = ctx.instance.tokens.active_children(parent).collect();
    let all_here = siblings
        .iter()
        .all(|sibling| ctx.instance.tokens.at(*sibling).node() == Some(node));
    if !all_here {
        return Ok(Flow::Wait);
    }

    tracing::debug!(
        node = %definition.full_name(node),
        tokens = siblings.len(),
        "Synchronized merge releasing tokens"
    );
    for sibling in siblings {
        let waiting = ctx.instance.tokens.at(sibling);
        if waiting.has_ended() || waiting.node() != Some(node) {
            continue;
        }
        engine::leave(&mut ctx.for_token(sibling), node, transition)?;
    }
    Ok(Flow::Wait)
}
