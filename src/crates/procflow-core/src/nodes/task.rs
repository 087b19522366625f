use crate::context::ExecutionContext;
use crate::definition::ProcessDefinition;
use crate::engine::Flow;
use crate::error::{ProcessError, Result};
use crate::node::{NodeId, TaskConfig};
use crate::nodes;

pub(super) fn execute(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &TaskConfig,
) -> Result<Flow> {
    let Some(manager) = ctx.services().task_manager.clone() else {
        return Ok(Flow::Wait);
    };
    let name = definition.full_name(node);
    let created = manager.create_tasks(ctx.instance.id(), ctx.token_id(), &name, &config.tasks)?;
    tracing::debug!(token = %ctx.token_name(), node = %name, created, "Tasks created");
    if created == 0 {
        nodes::default_flow(definition, node)
    } else {
        Ok(Flow::Wait)
    }
}

pub(super) fn before_leave(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    node: NodeId,
    config: &TaskConfig,
) -> Result<()> {
    let Some(manager) = ctx.services().task_manager.clone() else {
        return Ok(());
    };
    let instance = ctx.instance.id();
    let token = ctx.token_id();
    let name = definition.full_name(node);
    if config.blocking && manager.has_unfinished_tasks(instance, token, &name)? {
        return Err(ProcessError::illegal_state(format!(
            "task node '{}' still has unfinished blocking tasks",
            name
        )));
    }
    if config.end_tasks {
        manager.end_tasks(instance, token, &name)?;
    }
    Ok(())
}
