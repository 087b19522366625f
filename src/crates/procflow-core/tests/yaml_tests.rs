//! Declarative definitions loaded from YAML

mod common;

use common::EventLog;
use procflow_core::{
    ActionHandler, EvalValue, ExecutionContext, HandlerRegistry, ProcessDefinition, ProcessError,
    ProcessInstance, Result, YamlProcessDef,
};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const ORDER: &str = r#"
name: order
version: 2
events:
  process-end: [archive]
exception_handlers:
  - kind: OutOfStock
    actions: [backorder]
nodes:
  - name: start
    type: start
    transitions:
      - to: route
  - name: route
    type: decision
    handler: by-amount
    transitions:
      - name: express
        to: fulfil
      - name: review
        to: manual
  - name: manual
    type: state
    transitions:
      - to: fulfil
        actions: [approve]
  - name: fulfil
    type: fork
    transitions:
      - name: pick
        to: picking
      - name: bill
        to: billing
  - name: picking
    type: node
    action: reserve
    transitions:
      - to: join
  - name: billing
    type: state
    transitions:
      - to: join
  - name: join
    type: join
    transitions:
      - to: done
  - name: done
    type: end
"#;

/// Handler type registered by name
struct Record {
    log: EventLog,
    entry: &'static str,
}

impl ActionHandler for Record {
    fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<()> {
        self.log.push(self.entry);
        Ok(())
    }
}

fn record(log: &EventLog, entry: &'static str) -> Arc<Record> {
    Arc::new(Record {
        log: log.clone(),
        entry,
    })
}

fn registry(log: &EventLog) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    let approvals = log.clone();
    let reservations = log.clone();
    registry
        .register_action("archive", record(log, "archived"))
        .register_action("backorder", record(log, "backordered"))
        .register_action_fn("approve", move |ctx| {
            approvals.push("approved");
            ctx.set_variable("approved", json!(true));
            Ok(())
        })
        .register_action_fn("reserve", move |ctx| {
            let stock = ctx.variable("stock").and_then(|v| v.as_i64()).unwrap_or(0);
            if stock == 0 {
                return Err(ProcessError::raised("OutOfStock", "nothing left"));
            }
            reservations.push("reserved");
            ctx.leave_node(None)
        })
        .register_decision_fn("by-amount", |ctx| {
            let amount = ctx.variable("amount").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(if amount > 100 { "review" } else { "express" }.to_string())
        });
    registry
}

fn load(log: &EventLog) -> Arc<ProcessDefinition> {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(ORDER.as_bytes()).unwrap();
    Arc::new(ProcessDefinition::from_yaml_file(file.path(), &registry(log)).unwrap())
}

#[test]
fn test_load_from_file_and_run() {
    let log = EventLog::new();
    let definition = load(&log);
    assert_eq!(definition.name(), "order");
    assert_eq!(definition.version(), 2);

    let mut instance = ProcessInstance::builder(definition)
        .variable("amount", json!(250))
        .variable("stock", json!(3))
        .start()
        .unwrap();
    instance.signal().unwrap();
    assert_eq!(instance.node_name(instance.root_token()).as_deref(), Some("manual"));

    instance.signal().unwrap();
    assert_eq!(instance.variable("approved"), Some(json!(true)));
    assert_eq!(log.entries(), vec!["approved", "reserved"]);
    let picking = instance.find_token("/pick").unwrap();
    assert!(instance.token(picking).unwrap().has_ended());

    instance.signal_path("/bill", None).unwrap();
    assert!(instance.has_ended());
    assert_eq!(log.entries(), vec!["approved", "reserved", "archived"]);
}

#[test]
fn test_process_exception_handler_from_yaml() {
    let log = EventLog::new();
    let mut instance = ProcessInstance::builder(load(&log))
        .variable("amount", json!(10))
        .start()
        .unwrap();
    instance.signal().unwrap();

    assert_eq!(log.entries(), vec!["backordered"]);
    let picking = instance.find_token("/pick").unwrap();
    assert_eq!(instance.node_name(picking).as_deref(), Some("picking"));
    let billing = instance.find_token("/bill").unwrap();
    assert_eq!(instance.node_name(billing).as_deref(), Some("billing"));
}

#[test]
fn test_scripted_join_from_yaml() {
    let yaml = r#"
name: quorum
nodes:
  - name: start
    type: start
    transitions:
      - to: ask
  - name: ask
    type: fork
    transitions:
      - { name: alice, to: vote }
      - { name: bob, to: vote }
      - { name: carol, to: vote }
  - name: vote
    type: state
    transitions:
      - to: count
  - name: count
    type: join
    script: quorum
    transitions:
      - to: decided
  - name: decided
    type: state
"#;
    let mut registry = HandlerRegistry::new();
    registry.register_script_fn("quorum", |_| {
        Ok(HashMap::from([(
            "tokens".to_string(),
            EvalValue::Collection(vec!["alice".to_string(), "carol".to_string()]),
        )]))
    });
    let definition = Arc::new(ProcessDefinition::from_yaml(yaml, &registry).unwrap());
    let mut instance = ProcessInstance::new(definition).unwrap();
    instance.signal().unwrap();

    instance.signal_path("/carol", None).unwrap();
    assert_eq!(instance.node_name(instance.root_token()).as_deref(), Some("ask"));
    instance.signal_path("/alice", None).unwrap();
    assert_eq!(instance.node_name(instance.root_token()).as_deref(), Some("decided"));
}

#[test]
fn test_yaml_definition_round_trip() {
    let parsed = YamlProcessDef::from_str(ORDER).unwrap();
    let reparsed = YamlProcessDef::from_str(&parsed.to_yaml().unwrap()).unwrap();
    assert_eq!(reparsed.nodes.len(), parsed.nodes.len());
    assert_eq!(reparsed.exception_handlers.len(), 1);

    let log = EventLog::new();
    let definition = reparsed.to_definition(&registry(&log)).unwrap();
    assert!(definition.find_node("fulfil").is_some());
}

#[test]
fn test_missing_registry_entry() {
    let err = ProcessDefinition::from_yaml(ORDER, &HandlerRegistry::new()).unwrap_err();
    assert!(matches!(err, ProcessError::Configuration(_)));
}
