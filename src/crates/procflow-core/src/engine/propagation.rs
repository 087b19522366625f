//! Event firing and the exception-handler chain

use crate::context::ExecutionContext;
use crate::definition::{GraphElementRef, ProcessDefinition};
use crate::error::{ProcessError, Result};
use crate::event::{Action, EventType};
use crate::exception::{Exception, ExceptionHandler};
use crate::services::Message;

/// Fire `event_type` on `element` and propagate it outward
///
/// The element's own actions run first, then those of each enclosing scope
/// the event type reaches. `graph_element` follows the scope whose actions
/// run; `event_source` stays on `element`.
pub(crate) fn fire_event(
    ctx: &mut ExecutionContext<'_>,
    element: GraphElementRef,
    event_type: EventType,
) -> Result<()> {
    let definition = ctx.definition_arc();
    let chain = definition.propagation_chain(element, &event_type);
    if chain
        .iter()
        .all(|scope| definition.events_of(*scope).actions(&event_type).is_empty())
    {
        return Ok(());
    }
    tracing::trace!(
        event = %event_type,
        element = %definition.element_name(element),
        "Firing event"
    );

    let saved_event = ctx.event.replace(event_type.clone());
    let saved_source = ctx.event_source.replace(element);
    let saved_element = ctx.graph_element.take();

    let result = run_chain(ctx, &definition, &chain, &event_type);

    ctx.event = saved_event;
    ctx.event_source = saved_source;
    ctx.graph_element = saved_element;
    result
}

fn run_chain(
    ctx: &mut ExecutionContext<'_>,
    definition: &ProcessDefinition,
    chain: &[GraphElementRef],
    event_type: &EventType,
) -> Result<()> {
    for (depth, scope) in chain.iter().copied().enumerate() {
        let actions = definition.events_of(scope).actions(event_type);
        ctx.graph_element = Some(scope);
        for (index, action) in actions.iter().enumerate() {
            if depth > 0 && !action.is_propagation_allowed() {
                continue;
            }
            execute_action(ctx, scope, event_type, index, action)?;
        }
    }
    Ok(())
}

fn execute_action(
    ctx: &mut ExecutionContext<'_>,
    element: GraphElementRef,
    event_type: &EventType,
    index: usize,
    action: &Action,
) -> Result<()> {
    if action.is_async() {
        let message = Message::ExecuteAction {
            instance: ctx.instance.id(),
            token: ctx.token_id(),
            element,
            event: event_type.clone(),
            action_index: index,
        };
        return ctx.services().send(message);
    }
    run_action(ctx, element, action)
}

/// Run one action; its failure goes to the handlers of `element` and outward
pub(crate) fn run_action(
    ctx: &mut ExecutionContext<'_>,
    element: GraphElementRef,
    action: &Action,
) -> Result<()> {
    match action.execute(ctx) {
        Ok(()) => Ok(()),
        Err(error) => raise_exception(ctx, element, error),
    }
}

/// Offer an error to the exception handlers of `element` and its scopes
///
/// Returns `Ok` once a handler ran to completion. An error raised while a
/// handler runs is returned untouched; the outer search then continues from
/// the next scope. An unhandled user exception becomes
/// [`ProcessError::Delegation`].
pub(crate) fn raise_exception(
    ctx: &mut ExecutionContext<'_>,
    element: GraphElementRef,
    error: ProcessError,
) -> Result<()> {
    if ctx.exception.is_some() {
        return Err(error);
    }
    let definition = ctx.definition_arc();
    let mut error = error;
    let mut scope = Some(element);

    while let Some(current) = scope {
        let Some(exception) = Exception::from_error(&error) else {
            return Err(error);
        };
        let handler = definition
            .exception_handlers_of(current)
            .iter()
            .find(|handler| handler.matches(&exception.kind));
        if let Some(handler) = handler {
            tracing::debug!(
                kind = %exception.kind,
                scope = %definition.element_name(current),
                "Handling exception"
            );
            match run_handler(ctx, current, handler, exception) {
                Ok(()) => return Ok(()),
                Err(next) => {
                    tracing::warn!(
                        scope = %definition.element_name(current),
                        error = %next,
                        "Exception handler failed"
                    );
                    error = next;
                }
            }
        }
        scope = definition.parent_element(current);
    }

    Err(match error {
        ProcessError::Raised { kind, message } => ProcessError::Delegation {
            element: definition.element_name(element),
            kind,
            message,
        },
        other => other,
    })
}

fn run_handler(
    ctx: &mut ExecutionContext<'_>,
    element: GraphElementRef,
    handler: &ExceptionHandler,
    exception: Exception,
) -> Result<()> {
    let saved_element = ctx.graph_element.replace(element);
    ctx.exception = Some(exception);
    let mut result = Ok(());
    for action in handler.actions() {
        result = action.execute(ctx);
        if result.is_err() {
            break;
        }
    }
    ctx.exception = None;
    ctx.graph_element = saved_element;
    result
}
