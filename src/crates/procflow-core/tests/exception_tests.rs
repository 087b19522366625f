//! Exception handler lookup and recovery

mod common;

use common::EventLog;
use procflow_core::{
    Action, EventType, ExceptionHandler, NodeSpec, ProcessDefinition, ProcessError,
    ProcessInstance, TransitionSpec,
};
use serde_json::json;
use std::sync::Arc;

/// Action raising the exception kind stored in the `kind` variable
fn raising() -> Action {
    Action::from_fn(|ctx| {
        let kind = ctx
            .variable("kind")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "Unknown".to_string());
        Err(ProcessError::raised(kind, "work failed"))
    })
}

fn nested(outer: NodeSpec, inner: NodeSpec) -> Arc<ProcessDefinition> {
    let mut builder = ProcessDefinition::builder("failing");
    builder
        .add_node(NodeSpec::start("start").to("outer"))
        .add_node(
            outer.child(
                inner.child(
                    NodeSpec::action_node("work", raising())
                        .transition_named("fallback", "../../manual"),
                ),
            ),
        )
        .add_node(NodeSpec::state("manual"));
    Arc::new(builder.build().unwrap())
}

fn run(definition: Arc<ProcessDefinition>, kind: &str) -> (ProcessInstance, Result<(), ProcessError>) {
    let mut instance = ProcessInstance::builder(definition)
        .variable("kind", json!(kind))
        .start()
        .unwrap();
    let result = instance.signal();
    (instance, result)
}

#[test]
fn test_handler_on_enclosing_superstate() {
    let log = EventLog::new();
    let definition = nested(
        NodeSpec::super_state("outer")
            .exception_handler(ExceptionHandler::for_kind("Timeout").action(log.action("outer"))),
        NodeSpec::super_state("inner")
            .exception_handler(ExceptionHandler::for_kind("Declined").action(log.action("inner"))),
    );

    let (instance, result) = run(Arc::clone(&definition), "Timeout");
    result.unwrap();
    assert_eq!(log.entries(), vec!["outer"]);
    assert_eq!(
        instance.node_name(instance.root_token()).as_deref(),
        Some("outer/inner/work")
    );

    log.clear();
    let (_, result) = run(definition, "Declined");
    result.unwrap();
    assert_eq!(log.entries(), vec!["inner"]);
}

#[test]
fn test_unhandled_exception_becomes_delegation_error() {
    let definition = nested(
        NodeSpec::super_state("outer").exception_handler(ExceptionHandler::for_kind("Timeout")),
        NodeSpec::super_state("inner"),
    );

    let (_, result) = run(definition, "Corrupt");
    match result.unwrap_err() {
        ProcessError::Delegation {
            element,
            kind,
            message,
        } => {
            assert_eq!(element, "node 'outer/inner/work'");
            assert_eq!(kind, "Corrupt");
            assert_eq!(message, "work failed");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_handler_sees_exception_in_context() {
    let log = EventLog::new();
    let recorder = log.clone();
    let definition = nested(
        NodeSpec::super_state("outer").exception_handler(ExceptionHandler::any().action(
            Action::from_fn(move |ctx| {
                let exception = ctx.exception().unwrap();
                recorder.push(format!("{}: {}", exception.kind, exception.message));
                Ok(())
            }),
        )),
        NodeSpec::super_state("inner"),
    );

    let (_, result) = run(definition, "Timeout");
    result.unwrap();
    assert_eq!(log.entries(), vec!["Timeout: work failed"]);
}

#[test]
fn test_failing_handler_continues_outward() {
    let log = EventLog::new();
    let definition = nested(
        NodeSpec::super_state("outer").exception_handler(
            ExceptionHandler::for_kind("Escalated").action(log.action("escalation handled")),
        ),
        NodeSpec::super_state("inner").exception_handler(
            ExceptionHandler::for_kind("Timeout")
                .action(log.action("retrying"))
                .action(Action::from_fn(|_| {
                    Err(ProcessError::raised("Escalated", "retry budget spent"))
                }))
                .action(log.action("unreachable")),
        ),
    );

    let (_, result) = run(definition, "Timeout");
    result.unwrap();
    assert_eq!(log.entries(), vec!["retrying", "escalation handled"]);
}

#[test]
fn test_handler_can_move_the_token() {
    let definition = nested(
        NodeSpec::super_state("outer").exception_handler(ExceptionHandler::any().action(
            Action::from_fn(|ctx| ctx.leave_node(Some("fallback"))),
        )),
        NodeSpec::super_state("inner"),
    );

    let (instance, result) = run(definition, "Timeout");
    result.unwrap();
    assert_eq!(
        instance.node_name(instance.root_token()).as_deref(),
        Some("manual")
    );
}

#[test]
fn test_fatal_errors_bypass_handlers() {
    let mut builder = ProcessDefinition::builder("fatal");
    builder
        .add_node(NodeSpec::start("start").to("work"))
        .add_node(
            NodeSpec::action_node("work", Action::from_fn(|_| Err(ProcessError::fatal("disk gone"))))
                .exception_handler(ExceptionHandler::any()),
        )
        .exception_handler(ExceptionHandler::any());
    let mut instance = ProcessInstance::new(Arc::new(builder.build().unwrap())).unwrap();

    let err = instance.signal().unwrap_err();
    assert!(matches!(err, ProcessError::Fatal(_)));
}

#[test]
fn test_process_level_handler_catches_event_action_failures() {
    let log = EventLog::new();
    let mut builder = ProcessDefinition::builder("event-failures");
    builder
        .add_node(NodeSpec::start("start").to("check"))
        .add_node(
            NodeSpec::state("check")
                .on(
                    EventType::NodeEnter,
                    Action::from_fn(|_| Err(ProcessError::raised("Audit", "audit offline"))),
                )
                .transition(TransitionSpec::to("done").action(Action::from_fn(|_| {
                    Err(ProcessError::raised("Notify", "mail down"))
                }))),
        )
        .add_node(NodeSpec::state("done"))
        .exception_handler(ExceptionHandler::for_kind("Audit").action(log.action("audit")))
        .exception_handler(ExceptionHandler::for_kind("Notify").action(log.action("notify")));
    let mut instance = ProcessInstance::new(Arc::new(builder.build().unwrap())).unwrap();

    instance.signal().unwrap();
    assert_eq!(log.entries(), vec!["audit"]);
    assert_eq!(instance.node_name(instance.root_token()).as_deref(), Some("check"));

    instance.signal().unwrap();
    assert_eq!(log.entries(), vec!["audit", "notify"]);
    assert_eq!(instance.node_name(instance.root_token()).as_deref(), Some("done"));
}

#[test]
fn test_node_errors_reach_node_handlers() {
    let log = EventLog::new();
    let mut builder = ProcessDefinition::builder("node-errors");
    builder
        .add_node(NodeSpec::start("start").to("choose"))
        .add_node(
            NodeSpec::decision_expression("choose", "nowhere")
                .to("a")
                .exception_handler(
                    ExceptionHandler::for_kind("IllegalState").action(log.action("bad route")),
                ),
        )
        .add_node(NodeSpec::state("a"));
    let mut instance = ProcessInstance::new(Arc::new(builder.build().unwrap())).unwrap();

    instance.signal().unwrap();
    assert_eq!(log.entries(), vec!["bad route"]);
    assert_eq!(instance.node_name(instance.root_token()).as_deref(), Some("choose"));
}
