//! Token movement: signal, leave and enter
//!
//! Node behaviors never call back into `leave` for the token they are
//! executing. They return a [`Flow`] and the engine loops, so a long chain of
//! pass-through nodes runs in constant stack depth. Other tokens (fork
//! children, a parent reactivated by a join, merge siblings) are moved with a
//! nested [`leave`] on a context for that token.

pub(crate) mod propagation;

use crate::context::ExecutionContext;
use crate::definition::{GraphElementRef, ProcessDefinition};
use crate::delegation::ExpectedType;
use crate::error::{ProcessError, Result};
use crate::event::EventType;
use crate::node::NodeId;
use crate::nodes;
use crate::services::Message;
use crate::token::{TokenId, TokenTree};
use crate::transition::TransitionId;
use chrono::Utc;

/// What the engine does with the current token after a node behavior ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// The token stays where it is
    Wait,
    /// The token leaves over this transition
    Leave(TransitionId),
}

/// Lock reason of a token that forked children
pub(crate) fn fork_lock_reason(tokens: &TokenTree, token: TokenId) -> String {
    format!("token[{}]", tokens.full_name(token))
}

/// Lock reason of a token parked on an asynchronous node
pub(crate) fn job_lock_reason(definition: &ProcessDefinition, node: NodeId) -> String {
    format!("job[{}]", definition.full_name(node))
}

/// External signal of the context's token
pub(crate) fn signal(ctx: &mut ExecutionContext<'_>, transition: Option<&str>) -> Result<()> {
    let definition = ctx.definition_arc();
    let token = ctx.token_id();
    let node = signalable_node(ctx)?;

    let frame = (token, node);
    let outermost = !ctx.instance.signal_frames.contains(&frame);
    ctx.instance.signal_frames.push(frame);
    tracing::debug!(
        token = %ctx.token_name(),
        node = %definition.full_name(node),
        transition = transition.unwrap_or("<default>"),
        "Signal"
    );

    let result = signal_node(ctx, &definition, node, transition);
    ctx.instance.signal_frames.pop();
    result?;

    if outermost {
        let mut after = ctx.for_token(token);
        propagation::fire_event(&mut after, GraphElementRef::Node(node), EventType::AfterSignal)?;
    }
    Ok(())
}

fn signalable_node(ctx: &ExecutionContext<'_>) -> Result<NodeId> {
    let token = ctx.token();
    if token.has_ended() {
        return Err(ProcessError::illegal_state(format!(
            "token '{}' has ended and cannot be signalled",
            ctx.token_name()
        )));
    }
    if let Some(reason) = token.lock_reason() {
        return Err(ProcessError::illegal_state(format!(
            "token '{}' is locked by '{}' and cannot be signalled",
            ctx.token_name(),
            reason
        )));
    }
    if token.is_suspended() {
        return Err(ProcessError::illegal_state(format!(
            "token '{}' is suspended and cannot be signalled",
            ctx.token_name()
        )));
    }
    token.node().ok_or_else(|| {
        ProcessError::illegal_state(format!(
            "token '{}' is not on a node and cannot be signalled",
            ctx.token_name()
        ))
    })
}

fn signal_node(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    transition: Option<&str>,
) -> Result<()> {
    propagation::fire_event(ctx, GraphElementRef::Node(node), EventType::BeforeSignal)?;
    match transition {
        Some(name) => {
            let transition = definition.leaving_transition(node, name).ok_or_else(|| {
                ProcessError::illegal_state(format!(
                    "node '{}' has no leaving transition named '{}'",
                    definition.full_name(node),
                    name
                ))
            })?;
            leave(ctx, node, transition)
        }
        None => nodes::signal(ctx, node),
    }
}

/// Move the context's token from `from` over `transition`
///
/// Keeps going while the nodes it lands on pass the token straight through.
pub(crate) fn leave(
    ctx: &mut ExecutionContext<'_>,
    from: NodeId,
    transition: TransitionId,
) -> Result<()> {
    let mut next = Some((from, transition));
    while let Some((from, transition)) = next {
        step(ctx)?;
        next = take(ctx, from, transition)?;
    }
    Ok(())
}

/// Continue after a node behavior returned `flow`
pub(crate) fn proceed(ctx: &mut ExecutionContext<'_>, node: NodeId, flow: Flow) -> Result<()> {
    match flow {
        Flow::Wait => Ok(()),
        Flow::Leave(transition) => leave(ctx, node, transition),
    }
}

fn step(ctx: &mut ExecutionContext<'_>) -> Result<()> {
    let limit = ctx.services().config.max_steps_per_signal;
    ctx.instance.steps += 1;
    if ctx.instance.steps > limit {
        tracing::warn!(token = %ctx.token_name(), limit, "Step limit exceeded");
        return Err(ProcessError::StepLimitExceeded {
            token: ctx.token_name(),
            limit,
        });
    }
    Ok(())
}

/// Whether event actions already moved or ended the token
fn moved_on(ctx: &ExecutionContext<'_>, node: NodeId) -> bool {
    let token = ctx.token();
    token.has_ended() || token.node() != Some(node)
}

/// Take one transition; returns the next hop when the destination passes through
fn take(
    ctx: &mut ExecutionContext<'_>,
    from: NodeId,
    transition: TransitionId,
) -> Result<Option<(NodeId, TransitionId)>> {
    let definition = ctx.definition_arc();
    if ctx.token().has_ended() {
        return Err(ProcessError::illegal_state(format!(
            "token '{}' has ended and cannot leave node '{}'",
            ctx.token_name(),
            definition.full_name(from)
        )));
    }

    nodes::before_leave(ctx, from)?;
    ctx.token_mut().node = Some(from);
    ctx.transition = Some(transition);
    ctx.transition_source = Some(from);

    propagation::fire_event(ctx, GraphElementRef::Node(from), EventType::NodeLeave)?;
    if moved_on(ctx, from) {
        return Ok(None);
    }

    let to = definition.transition(transition).to();
    let destination = definition.first_leaf(to);
    for scope in definition.ancestors(from) {
        if definition.contains(scope, destination) {
            break;
        }
        propagation::fire_event(ctx, GraphElementRef::Node(scope), EventType::SuperStateLeave)?;
    }

    let taken = definition.transition(transition);
    if taken.is_condition_enforced() {
        if let Some(condition) = taken.condition() {
            if !ctx.evaluate(condition, ExpectedType::Boolean)?.is_true() {
                return Err(ProcessError::illegal_state(format!(
                    "condition '{}' of {} is false",
                    condition,
                    definition.element_name(GraphElementRef::Transition(transition))
                )));
            }
        }
    }

    tracing::trace!(
        token = %ctx.token_name(),
        from = %definition.full_name(from),
        to = %definition.full_name(destination),
        "Taking transition"
    );
    propagation::fire_event(ctx, GraphElementRef::Transition(transition), EventType::Transition)?;

    let (node, flow) = enter(ctx, to, Some(from))?;
    Ok(match flow {
        Flow::Leave(next) => Some((node, next)),
        Flow::Wait => None,
    })
}

/// Place the context's token on `target` and execute it
///
/// Returns the node actually entered (the first leaf of a superstate) and
/// what its behavior wants next.
pub(crate) fn enter(
    ctx: &mut ExecutionContext<'_>,
    target: NodeId,
    previous: Option<NodeId>,
) -> Result<(NodeId, Flow)> {
    let definition = ctx.definition_arc();
    let destination = definition.first_leaf(target);
    {
        let token = ctx.token_mut();
        token.node = Some(destination);
        token.node_enter = Some(Utc::now());
    }

    let entered: Vec<NodeId> = definition
        .ancestors(destination)
        .take_while(|scope| previous.map_or(true, |p| !definition.contains(*scope, p)))
        .collect();
    for scope in entered {
        propagation::fire_event(ctx, GraphElementRef::Node(scope), EventType::SuperStateEnter)?;
    }

    propagation::fire_event(ctx, GraphElementRef::Node(destination), EventType::NodeEnter)?;
    if moved_on(ctx, destination) {
        return Ok((destination, Flow::Wait));
    }
    ctx.transition = None;
    ctx.transition_source = None;

    if definition.node(destination).is_async() {
        ctx.token_mut()
            .lock(job_lock_reason(&definition, destination))?;
        let message = Message::ExecuteNode {
            instance: ctx.instance.id(),
            token: ctx.token_id(),
            node: destination,
        };
        ctx.services().send(message)?;
        tracing::debug!(
            token = %ctx.token_name(),
            node = %definition.full_name(destination),
            "Node execution dispatched"
        );
        return Ok((destination, Flow::Wait));
    }

    let flow = nodes::execute(ctx, destination)?;
    Ok((destination, flow))
}

/// End a token and its active descendants
///
/// With `verify_parent` a parent left without active children ends too,
/// cascading towards the root. Ending the root ends the instance.
pub(crate) fn end_token(
    ctx: &mut ExecutionContext<'_>,
    token: TokenId,
    verify_parent: bool,
) -> Result<()> {
    if ctx.instance.tokens.token(token)?.has_ended() {
        return Ok(());
    }
    let children = ctx.instance.tokens.at(token).children().to_vec();
    for child in children {
        end_token(ctx, child, false)?;
    }

    let name = ctx.instance.tokens.full_name(token);
    let ending = ctx.instance.tokens.at_mut(token);
    ending.end = Some(Utc::now());
    if let Some(sub) = ending.sub_process.as_deref_mut() {
        if !sub.has_ended() {
            sub.end()?;
        }
    }
    let parent = ending.parent;
    tracing::debug!(token = %name, "Token ended");

    match parent {
        None => finish_instance(ctx),
        Some(parent) if verify_parent && !ctx.instance.tokens.has_active_children(parent) => {
            end_token(ctx, parent, true)
        }
        Some(_) => Ok(()),
    }
}

fn finish_instance(ctx: &mut ExecutionContext<'_>) -> Result<()> {
    if ctx.instance.end.is_some() {
        return Ok(());
    }
    ctx.instance.end = Some(Utc::now());
    let root = ctx.instance.tokens.root();
    let mut root_ctx = ctx.for_token(root);
    propagation::fire_event(&mut root_ctx, GraphElementRef::Process, EventType::ProcessEnd)?;
    tracing::info!(
        instance = %ctx.instance.id(),
        process = %ctx.definition().name(),
        "Process instance ended"
    );
    Ok(())
}
