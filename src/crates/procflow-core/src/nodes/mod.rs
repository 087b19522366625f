//! Node behaviors
//!
//! One module per node kind with non-trivial behavior. Each behavior returns a
//! [`Flow`] for the token it executes; the engine does the moving.

mod decision;
mod end;
mod fork;
mod interleave;
mod join;
mod merge;
pub(crate) mod subprocess;
mod task;

use crate::context::ExecutionContext;
use crate::definition::{GraphElementRef, ProcessDefinition};
use crate::engine::{self, propagation, Flow};
use crate::error::{ProcessError, Result};
use crate::node::{NodeId, NodeKind, PlainConfig};
use crate::transition::TransitionId;

/// Execute the node the context's token was just placed on
///
/// Failures go through the node's exception handlers; a handled failure
/// leaves the token waiting on the node.
pub(crate) fn execute(ctx: &mut ExecutionContext<'_>, node: NodeId) -> Result<Flow> {
    let definition = ctx.definition_arc();
    let result = match definition.node(node).kind() {
        NodeKind::Start | NodeKind::State | NodeKind::SuperState => Ok(Flow::Wait),
        NodeKind::End(config) => end::execute(ctx, config),
        NodeKind::Plain(config) => execute_plain(ctx, &definition, node, config),
        NodeKind::Decision(config) => decision::execute(ctx, &definition, node, config),
        NodeKind::Fork(config) => fork::execute(ctx, &definition, node, config),
        NodeKind::Join(config) => join::execute(ctx, &definition, node, config),
        NodeKind::Merge(config) => merge::execute(ctx, &definition, node, config),
        NodeKind::InterleaveStart(config) => interleave::start(ctx, &definition, node, config),
        NodeKind::InterleaveEnd => interleave::end(ctx, &definition, node),
        NodeKind::Task(config) => task::execute(ctx, &definition, node, config),
        NodeKind::SubProcess(config) => subprocess::execute(ctx, &definition, node, config),
    };
    handled(ctx, node, result)
}

/// Route a failed node behavior through the node's exception handlers
pub(crate) fn handled(
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    result: Result<Flow>,
) -> Result<Flow> {
    match result {
        Ok(flow) => Ok(flow),
        Err(error) => {
            propagation::raise_exception(ctx, GraphElementRef::Node(node), error)?;
            Ok(Flow::Wait)
        }
    }
}

/// Default response to a signal without a transition name
pub(crate) fn signal(ctx: &mut ExecutionContext<'_>, node: NodeId) -> Result<()> {
    let definition = ctx.definition_arc();
    let transition = default_transition(&definition, node)?;
    engine::leave(ctx, node, transition)
}

/// Guard run before a token leaves `node`
pub(crate) fn before_leave(ctx: &mut ExecutionContext<'_>, node: NodeId) -> Result<()> {
    let definition = ctx.definition_arc();
    match definition.node(node).kind() {
        NodeKind::Task(config) => task::before_leave(ctx, &definition, node, config),
        NodeKind::SubProcess(_) => subprocess::before_leave(ctx, &definition, node),
        _ => Ok(()),
    }
}

pub(crate) fn default_transition(
    definition: &ProcessDefinition,
    node: NodeId,
) -> Result<TransitionId> {
    definition.default_leaving_transition(node).ok_or_else(|| {
        ProcessError::configuration(format!(
            "no default transition leaving node '{}'",
            definition.full_name(node)
        ))
    })
}

/// Leave over the default transition, or fail when there is none
pub(crate) fn default_flow(definition: &ProcessDefinition, node: NodeId) -> Result<Flow> {
    default_transition(definition, node).map(Flow::Leave)
}

fn execute_plain(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &PlainConfig,
) -> Result<Flow> {
    match &config.action {
        // the action decides whether and where the token goes
        Some(action) => {
            let saved = ctx.graph_element.replace(GraphElementRef::Node(node));
            let result = action.execute(ctx);
            ctx.graph_element = saved;
            result.map(|()| Flow::Wait)
        }
        None => default_flow(definition, node),
    }
}
