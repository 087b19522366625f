//! Superstate scoping and event propagation

mod common;

use common::{element_name, EventLog};
use procflow_core::{
    Action, EventType, GraphElementRef, NodeSpec, ProcessDefinition, ProcessInstance,
    TransitionSpec,
};
use std::sync::Arc;

/// start -> outer/inner/{work -> review} -> done
fn nested(
    outer: NodeSpec,
    inner: NodeSpec,
    configure: impl FnOnce(&mut procflow_core::ProcessDefinitionBuilder),
) -> Arc<ProcessDefinition> {
    let mut builder = ProcessDefinition::builder("nested");
    builder
        .add_node(NodeSpec::start("start").to("outer"))
        .add_node(
            outer
                .child(
                    inner
                        .child(NodeSpec::state("work").transition_named("next", "review"))
                        .child(
                            NodeSpec::state("review")
                                .transition_named("finish", "../../done")
                                .transition_named("aside", "../other"),
                        ),
                )
                .child(NodeSpec::state("other").to("../done"))
                .transition_named("escape", "done"),
        )
        .add_node(NodeSpec::end("done"));
    configure(&mut builder);
    Arc::new(builder.build().unwrap())
}

fn outer() -> NodeSpec {
    NodeSpec::super_state("outer")
}

fn inner() -> NodeSpec {
    NodeSpec::super_state("inner")
}

#[test]
fn test_superstate_enter_fires_innermost_first() {
    let log = EventLog::new();
    let definition = nested(
        outer().on(EventType::SuperStateEnter, log.source_action("outer")),
        inner().on(EventType::SuperStateEnter, log.source_action("inner")),
        |_| {},
    );
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();

    assert_eq!(
        instance.node_name(instance.root_token()).as_deref(),
        Some("outer/inner/work")
    );
    assert_eq!(log.entries(), vec!["inner@inner", "outer@inner", "outer@outer"]);
}

#[test]
fn test_action_without_propagation_runs_only_for_own_events() {
    let log = EventLog::new();
    let definition = nested(
        outer().on(
            EventType::SuperStateEnter,
            log.source_action("outer").without_propagation(),
        ),
        inner().on(EventType::SuperStateEnter, log.source_action("inner")),
        |_| {},
    );
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();

    assert_eq!(log.entries(), vec!["inner@inner", "outer@outer"]);
}

#[test]
fn test_graph_element_follows_the_running_scope() {
    let log = EventLog::new();
    let recorder = log.clone();
    let definition = nested(
        outer().on(
            EventType::SuperStateEnter,
            Action::from_fn(move |ctx| {
                let source = element_name(ctx, ctx.event_source());
                let scope = element_name(ctx, ctx.graph_element());
                recorder.push(format!("{} in {}", source, scope));
                Ok(())
            }),
        ),
        inner(),
        |_| {},
    );
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();

    assert_eq!(log.entries(), vec!["inner in outer", "outer in outer"]);
}

#[test]
fn test_superstate_leave_fires_innermost_first() {
    let log = EventLog::new();
    let definition = nested(
        outer().on(EventType::SuperStateLeave, log.source_action("outer")),
        inner().on(EventType::SuperStateLeave, log.source_action("inner")),
        |builder| {
            builder.on(EventType::SuperStateLeave, log.source_action("process"));
        },
    );
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();
    instance.signal().unwrap();
    assert!(log.entries().is_empty(), "moving inside inner leaves nothing");

    instance.signal_transition("finish").unwrap();
    assert_eq!(
        log.entries(),
        vec![
            "inner@inner",
            "outer@inner",
            "process@inner",
            "outer@outer",
            "process@outer"
        ]
    );
    assert!(instance.has_ended());
}

#[test]
fn test_moving_within_outer_leaves_only_inner() {
    let log = EventLog::new();
    let definition = nested(
        outer()
            .on(EventType::SuperStateLeave, log.source_action("outer-leave"))
            .on(EventType::SuperStateEnter, log.source_action("outer-enter")),
        inner().on(EventType::SuperStateLeave, log.source_action("inner-leave")),
        |_| {},
    );
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();
    instance.signal().unwrap();
    log.clear();

    instance.signal_transition("aside").unwrap();
    assert_eq!(
        instance.node_name(instance.root_token()).as_deref(),
        Some("outer/other")
    );
    assert_eq!(log.entries(), vec!["inner-leave@inner", "outer-leave@inner"]);
}

#[test]
fn test_node_enter_reaches_only_enclosing_superstate() {
    let log = EventLog::new();
    let definition = nested(
        outer().on(EventType::NodeEnter, log.source_action("outer")),
        inner().on(EventType::NodeEnter, log.source_action("inner")),
        |builder| {
            builder.on(EventType::NodeEnter, log.source_action("process"));
        },
    );
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();
    instance.signal().unwrap();
    instance.signal_transition("finish").unwrap();

    assert_eq!(log.entries(), vec!["inner@work", "inner@review"]);
}

#[test]
fn test_transition_event_propagates_to_transition_scope() {
    let log = EventLog::new();
    let definition = {
        let mut builder = ProcessDefinition::builder("transitions");
        builder
            .add_node(NodeSpec::start("start").to("outer"))
            .add_node(
                NodeSpec::super_state("outer")
                    .on(EventType::Transition, log.source_action("outer"))
                    .child(
                        NodeSpec::state("work").transition(
                            TransitionSpec::to("review")
                                .named("next")
                                .action(log.source_action("own")),
                        ),
                    )
                    .child(NodeSpec::state("review").transition_named("finish", "../done")),
            )
            .add_node(NodeSpec::end("done"))
            .on(EventType::Transition, log.source_action("process"));
        Arc::new(builder.build().unwrap())
    };
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();
    assert_eq!(log.entries(), vec!["process@transition"]);
    log.clear();

    instance.signal().unwrap();
    assert_eq!(log.entries(), vec!["own@next", "outer@next", "process@next"]);
    log.clear();

    instance.signal().unwrap();
    assert_eq!(log.entries(), vec!["process@finish"]);
}

#[test]
fn test_transition_context_during_transition_event() {
    let log = EventLog::new();
    let recorder = log.clone();
    let mut builder = ProcessDefinition::builder("context");
    builder
        .add_node(NodeSpec::start("start").to("a"))
        .add_node(
            NodeSpec::state("a").transition(TransitionSpec::to("b").named("go").action(
                Action::from_fn(move |ctx| {
                    let transition = ctx.transition().and_then(|t| t.name()).unwrap_or("");
                    let source = ctx
                        .transition_source()
                        .map(|id| ctx.definition().node(id).name().to_string())
                        .unwrap_or_default();
                    recorder.push(format!("{} from {}", transition, source));
                    Ok(())
                }),
            )),
        )
        .add_node(NodeSpec::state("b"));
    let mut instance = ProcessInstance::new(Arc::new(builder.build().unwrap())).unwrap();
    instance.signal().unwrap();
    instance.signal().unwrap();

    assert_eq!(log.entries(), vec!["go from a"]);
}

#[test]
fn test_transition_inherited_from_superstate() {
    let log = EventLog::new();
    let definition = nested(
        outer().on(EventType::SuperStateLeave, log.source_action("outer")),
        inner().on(EventType::SuperStateLeave, log.source_action("inner")),
        |_| {},
    );
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();

    instance.signal_transition("escape").unwrap();
    assert!(instance.has_ended());
    assert_eq!(log.entries(), vec!["inner@inner", "outer@inner", "outer@outer"]);
}

#[test]
fn test_custom_event_fired_from_action() {
    let log = EventLog::new();
    let audit = EventType::Custom("audit".to_string());
    let mut builder = ProcessDefinition::builder("custom");
    builder
        .add_node(NodeSpec::start("start").to("outer"))
        .add_node(
            NodeSpec::super_state("outer")
                .on(audit.clone(), log.source_action("outer"))
                .child(
                    NodeSpec::action_node(
                        "notify",
                        Action::from_fn(|ctx| {
                            let node = ctx.token().node().unwrap();
                            ctx.fire_event(
                                GraphElementRef::Node(node),
                                EventType::Custom("audit".to_string()),
                            )?;
                            ctx.leave_node(None)
                        }),
                    )
                    .to("../waiting"),
                ),
        )
        .add_node(NodeSpec::state("waiting"))
        .on(audit, log.source_action("process"));
    let mut instance = ProcessInstance::new(Arc::new(builder.build().unwrap())).unwrap();
    instance.signal().unwrap();

    assert_eq!(log.entries(), vec!["outer@notify", "process@notify"]);
    assert_eq!(
        instance.node_name(instance.root_token()).as_deref(),
        Some("waiting")
    );
}
