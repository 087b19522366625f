//! Sub-process nodes: a child instance owned by the arriving token

use crate::context::ExecutionContext;
use crate::definition::{GraphElementRef, ProcessDefinition};
use crate::engine::{propagation, Flow};
use crate::error::{ProcessError, Result};
use crate::event::EventType;
use crate::instance::{ProcessInstance, SuperProcessRef};
use crate::node::{NodeId, NodeKind, SubProcessConfig};
use crate::nodes;
use crate::services::Message;
use crate::variables::InMemoryVariableStore;
use serde_json::Value;
use std::sync::Arc;

pub(super) fn execute(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &SubProcessConfig,
) -> Result<Flow> {
    let services = ctx.services_arc();
    let resolver = services.sub_process_resolver.as_ref().ok_or_else(|| {
        ProcessError::configuration(format!(
            "sub-process node '{}' needs a sub-process resolver",
            definition.full_name(node)
        ))
    })?;
    let sub_definition = resolver
        .resolve(&config.name, config.version)?
        .ok_or_else(|| {
            ProcessError::configuration(format!(
                "sub-process definition '{}' (version {}) not found",
                config.name,
                config
                    .version
                    .map_or_else(|| "latest".to_string(), |v| v.to_string())
            ))
        })?;

    let mut sub = ProcessInstance::create(
        sub_definition,
        Arc::clone(&services),
        Box::new(InMemoryVariableStore::new()),
    );
    sub.super_process = Some(SuperProcessRef {
        instance: ctx.instance.id(),
        token: ctx.token_id(),
    });
    let sub_root = sub.root_token();
    for mapping in config.mappings.iter().filter(|m| m.read) {
        if let Some(value) = ctx.variable(&mapping.variable) {
            sub.variables.set(sub_root, &mapping.mapped_name, value);
        }
    }
    sub.begin()?;

    let sub_id = sub.id();
    tracing::info!(
        token = %ctx.token_name(),
        node = %definition.full_name(node),
        sub_process = %config.name,
        sub_instance = %sub_id,
        "Sub-process created"
    );
    ctx.token_mut().sub_process = Some(Box::new(sub));
    propagation::fire_event(ctx, GraphElementRef::Node(node), EventType::SubProcessCreated)?;

    if config.is_async {
        let message = Message::StartSubProcess {
            instance: ctx.instance.id(),
            token: ctx.token_id(),
            sub_instance: sub_id,
        };
        ctx.services().send(message)?;
        return Ok(Flow::Wait);
    }
    start(ctx, definition, node, config)
}

/// Run the sub-process off its start state; completes it if it ended
fn start(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &SubProcessConfig,
) -> Result<Flow> {
    let sub = ctx.token_mut().sub_process.as_deref_mut().ok_or_else(|| {
        ProcessError::illegal_state(format!(
            "sub-process node '{}' has no sub-process instance",
            definition.full_name(node)
        ))
    })?;
    let start_state = sub.definition().start_state();
    let root = sub.root_token();
    let at_start = start_state.is_some() && sub.token(root).and_then(|t| t.node()) == start_state;
    if at_start && !sub.has_ended() {
        sub.signal()?;
    }
    if sub.has_ended() {
        complete(ctx, definition, node, config)
    } else {
        Ok(Flow::Wait)
    }
}

/// Copy results out of an ended sub-process and move on
fn complete(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &SubProcessConfig,
) -> Result<Flow> {
    let outputs: Vec<(String, Value)> = match ctx.token().sub_process() {
        Some(sub) => config
            .mappings
            .iter()
            .filter(|m| m.write)
            .filter_map(|m| sub.variable(&m.mapped_name).map(|v| (m.variable.clone(), v)))
            .collect(),
        None => Vec::new(),
    };
    for (name, value) in outputs {
        ctx.set_variable(&name, value);
    }
    tracing::debug!(
        token = %ctx.token_name(),
        node = %definition.full_name(node),
        "Sub-process completed"
    );
    propagation::fire_event(ctx, GraphElementRef::Node(node), EventType::SubProcessEnd)?;
    nodes::default_flow(definition, node)
}

pub(super) fn before_leave(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
) -> Result<()> {
    let running = ctx
        .token()
        .sub_process()
        .is_some_and(|sub| !sub.has_ended());
    if running {
        return Err(ProcessError::illegal_state(format!(
            "token '{}' cannot leave '{}' while its sub-process is running",
            ctx.token_name(),
            definition.full_name(node)
        )));
    }
    Ok(())
}

fn config_of(definition: &ProcessDefinition, node: NodeId) -> Result<&SubProcessConfig> {
    match definition.node(node).kind() {
        NodeKind::SubProcess(config) => Ok(config),
        other => Err(ProcessError::illegal_state(format!(
            "node '{}' is a {} node, not a sub-process",
            definition.full_name(node),
            other.type_name()
        ))),
    }
}

/// Resume a sub-process whose start was dispatched as a message
pub(crate) fn start_at(ctx: &mut ExecutionContext<'_>, node: NodeId) -> Result<Flow> {
    let definition = ctx.definition_arc();
    let config = config_of(&definition, node)?;
    let result = start(ctx, &definition, node, config);
    nodes::handled(ctx, node, result)
}

/// Continue the super-process token after its sub-process ended
pub(crate) fn complete_at(ctx: &mut ExecutionContext<'_>, node: NodeId) -> Result<Flow> {
    let definition = ctx.definition_arc();
    let config = config_of(&definition, node)?;
    let result = complete(ctx, &definition, node, config);
    nodes::handled(ctx, node, result)
}
