//! Builder API for process definitions
//!
//! Nodes are declared as [`NodeSpec`]s (superstates nest child specs) and
//! transitions as [`TransitionSpec`]s whose destination is a textual path
//! resolved against the declaring node's scope. [`ProcessDefinitionBuilder::build`]
//! flattens the specs into arenas, resolves every path and validates the
//! graph, so malformed definitions fail here and never at execution time.
//!
//! # Example
//!
//! ```rust
//! use procflow_core::builder::NodeSpec;
//! use procflow_core::definition::ProcessDefinition;
//!
//! let mut builder = ProcessDefinition::builder("review");
//! builder
//!     .add_node(NodeSpec::start("start").to("review"))
//!     .add_node(
//!         NodeSpec::state("review")
//!             .transition_named("approve", "done")
//!             .transition_named("reject", "rework"),
//!     )
//!     .add_node(NodeSpec::state("rework").to("review"))
//!     .add_node(NodeSpec::end("done"));
//! let definition = builder.build().unwrap();
//! assert_eq!(definition.find_node("review").unwrap().leaving_transitions().len(), 2);
//! ```

use crate::definition::ProcessDefinition;
use crate::delegation::{DecisionHandler, Script};
use crate::error::{ProcessError, Result};
use crate::event::{Action, EventType, Events};
use crate::exception::ExceptionHandler;
use crate::node::{
    DecisionConfig, EndConfig, ForkConfig, InterleaveConfig, JoinConfig, MergeConfig, Node,
    NodeId, NodeKind, PlainConfig, SubProcessConfig, TaskConfig,
};
use crate::transition::{Transition, TransitionId};
use std::sync::Arc;

/// Declared transition with a textual destination
#[derive(Debug, Clone)]
pub struct TransitionSpec {
    pub(crate) name: Option<String>,
    pub(crate) to: String,
    pub(crate) condition: Option<String>,
    pub(crate) actions: Vec<Action>,
    pub(crate) description: Option<String>,
}

impl TransitionSpec {
    pub fn to(destination: impl Into<String>) -> Self {
        Self {
            name: None,
            to: destination.into(),
            condition: None,
            actions: Vec::new(),
            description: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Guard expression; a transition with a condition is never the default
    pub fn condition(mut self, expression: impl Into<String>) -> Self {
        self.condition = Some(expression.into());
        self
    }

    /// Action run on the transition's `transition` event
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Declared node
#[derive(Clone)]
pub struct NodeSpec {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) transitions: Vec<TransitionSpec>,
    pub(crate) events: Events,
    pub(crate) exception_handlers: Vec<ExceptionHandler>,
    pub(crate) children: Vec<NodeSpec>,
    pub(crate) is_async: bool,
    pub(crate) description: Option<String>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            transitions: Vec::new(),
            events: Events::default(),
            exception_handlers: Vec::new(),
            children: Vec::new(),
            is_async: false,
            description: None,
        }
    }

    pub fn start(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Start)
    }

    pub fn end(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::End(EndConfig::default()))
    }

    /// End state that terminates the whole process instance
    pub fn end_process(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::End(EndConfig { ends_process: true }))
    }

    pub fn state(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::State)
    }

    /// Pass-through node without behavior
    pub fn node(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Plain(PlainConfig::default()))
    }

    /// Node whose action decides how to continue
    pub fn action_node(name: impl Into<String>, action: Action) -> Self {
        Self::new(
            name,
            NodeKind::Plain(PlainConfig {
                action: Some(action),
            }),
        )
    }

    /// Decision choosing among its leaving transitions' inline conditions
    pub fn decision(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Decision(DecisionConfig::default()))
    }

    pub fn decision_handler(name: impl Into<String>, handler: Arc<dyn DecisionHandler>) -> Self {
        Self::new(
            name,
            NodeKind::Decision(DecisionConfig {
                handler: Some(handler),
                ..Default::default()
            }),
        )
    }

    /// Decision whose expression result names the transition
    pub fn decision_expression(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(
            name,
            NodeKind::Decision(DecisionConfig {
                expression: Some(expression.into()),
                ..Default::default()
            }),
        )
    }

    pub fn fork(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Fork(ForkConfig::default()))
    }

    /// Fork over the transitions named by `script`'s collection output
    pub fn fork_with_script(name: impl Into<String>, script: Arc<dyn Script>) -> Self {
        Self::new(
            name,
            NodeKind::Fork(ForkConfig {
                script: Some(script),
            }),
        )
    }

    pub fn join(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Join(JoinConfig::default()))
    }

    pub fn join_with(name: impl Into<String>, config: JoinConfig) -> Self {
        Self::new(name, NodeKind::Join(config))
    }

    pub fn merge(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Merge(MergeConfig::default()))
    }

    pub fn synchronized_merge(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Merge(MergeConfig { synchronized: true }))
    }

    pub fn interleave_start(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::InterleaveStart(InterleaveConfig::default()))
    }

    pub fn interleave_start_with(name: impl Into<String>, config: InterleaveConfig) -> Self {
        Self::new(name, NodeKind::InterleaveStart(config))
    }

    pub fn interleave_end(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::InterleaveEnd)
    }

    pub fn task(name: impl Into<String>, config: TaskConfig) -> Self {
        Self::new(name, NodeKind::Task(config))
    }

    pub fn sub_process(name: impl Into<String>, config: SubProcessConfig) -> Self {
        Self::new(name, NodeKind::SubProcess(config))
    }

    pub fn super_state(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::SuperState)
    }

    /// Unnamed transition to `destination`
    pub fn to(self, destination: impl Into<String>) -> Self {
        self.transition(TransitionSpec::to(destination))
    }

    pub fn transition_named(self, name: impl Into<String>, destination: impl Into<String>) -> Self {
        self.transition(TransitionSpec::to(destination).named(name))
    }

    pub fn transition(mut self, spec: TransitionSpec) -> Self {
        self.transitions.push(spec);
        self
    }

    pub fn on(mut self, event_type: EventType, action: Action) -> Self {
        self.events.add_action(event_type, action);
        self
    }

    pub fn exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handlers.push(handler);
        self
    }

    /// Nested node; only valid on superstates
    pub fn child(mut self, spec: NodeSpec) -> Self {
        self.children.push(spec);
        self
    }

    /// Execute this node through an `ExecuteNode` message
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Incremental builder for [`ProcessDefinition`]
pub struct ProcessDefinitionBuilder {
    name: String,
    version: u32,
    description: Option<String>,
    nodes: Vec<NodeSpec>,
    events: Events,
    exception_handlers: Vec<ExceptionHandler>,
}

impl ProcessDefinitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            description: None,
            nodes: Vec::new(),
            events: Events::default(),
            exception_handlers: Vec::new(),
        }
    }

    pub fn version(&mut self, version: u32) -> &mut Self {
        self.version = version;
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Add a node at process scope
    pub fn add_node(&mut self, spec: NodeSpec) -> &mut Self {
        self.nodes.push(spec);
        self
    }

    /// Add a node inside the superstate at `scope_path` (`""` or `"/"` = process scope)
    pub fn add_node_in(&mut self, scope_path: &str, spec: NodeSpec) -> Result<&mut Self> {
        if scope_path.trim_matches('/').is_empty() {
            return Ok(self.add_node(spec));
        }
        let scope = self.spec_mut(scope_path).ok_or_else(|| {
            ProcessError::configuration(format!("scope '{}' not found", scope_path))
        })?;
        if !matches!(scope.kind, NodeKind::SuperState) {
            return Err(ProcessError::configuration(format!(
                "'{}' is a {} node and cannot contain nodes",
                scope_path,
                scope.kind.type_name()
            )));
        }
        scope.children.push(spec);
        Ok(self)
    }

    /// Add a leaving transition to the node at `node_path`
    pub fn add_transition(&mut self, node_path: &str, spec: TransitionSpec) -> Result<&mut Self> {
        let node = self.spec_mut(node_path).ok_or_else(|| {
            ProcessError::configuration(format!("node '{}' not found", node_path))
        })?;
        node.transitions.push(spec);
        Ok(self)
    }

    /// Process-scoped event action
    pub fn on(&mut self, event_type: EventType, action: Action) -> &mut Self {
        self.events.add_action(event_type, action);
        self
    }

    /// Process-scoped exception handler, consulted last
    pub fn exception_handler(&mut self, handler: ExceptionHandler) -> &mut Self {
        self.exception_handlers.push(handler);
        self
    }

    fn spec_mut(&mut self, path: &str) -> Option<&mut NodeSpec> {
        let mut segments = path.trim_matches('/').split('/');
        let first = segments.next()?;
        let mut current = self.nodes.iter_mut().find(|n| n.name == first)?;
        for segment in segments {
            current = current.children.iter_mut().find(|n| n.name == segment)?;
        }
        Some(current)
    }

    /// Resolve and validate the graph
    pub fn build(self) -> Result<ProcessDefinition> {
        let mut definition = ProcessDefinition {
            name: self.name,
            version: self.version,
            description: self.description,
            nodes: Vec::new(),
            transitions: Vec::new(),
            top_level: Vec::new(),
            start_state: None,
            events: self.events,
            exception_handlers: self.exception_handlers,
        };

        let mut pending = Vec::new();
        for spec in self.nodes {
            check_name(&definition, None, &spec.name)?;
            let id = flatten(&mut definition, spec, None, &mut pending)?;
            definition.top_level.push(id);
        }

        for (from, specs) in pending {
            for spec in specs {
                resolve_transition(&mut definition, from, spec)?;
            }
        }

        validate(&mut definition)?;

        tracing::debug!(
            process = %definition.name,
            version = definition.version,
            nodes = definition.nodes.len(),
            transitions = definition.transitions.len(),
            "Built process definition"
        );
        Ok(definition)
    }
}

fn check_name(definition: &ProcessDefinition, scope: Option<NodeId>, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == ".." || name == "." {
        return Err(ProcessError::configuration(format!(
            "invalid node name '{}'",
            name
        )));
    }
    if definition.child_named(scope, name).is_some() {
        let scope_name = scope
            .map(|id| definition.full_name(id))
            .unwrap_or_else(|| "process scope".to_string());
        return Err(ProcessError::configuration(format!(
            "duplicate node name '{}' in {}",
            name, scope_name
        )));
    }
    Ok(())
}

fn flatten(
    definition: &mut ProcessDefinition,
    spec: NodeSpec,
    parent: Option<NodeId>,
    pending: &mut Vec<(NodeId, Vec<TransitionSpec>)>,
) -> Result<NodeId> {
    let id = NodeId(definition.nodes.len());
    if !spec.children.is_empty() && !matches!(spec.kind, NodeKind::SuperState) {
        return Err(ProcessError::configuration(format!(
            "{} node '{}' cannot contain nodes",
            spec.kind.type_name(),
            spec.name
        )));
    }

    definition.nodes.push(Node {
        id,
        name: spec.name,
        kind: spec.kind,
        parent,
        children: Vec::new(),
        leaving: Vec::new(),
        arriving: Vec::new(),
        events: spec.events,
        exception_handlers: spec.exception_handlers,
        is_async: spec.is_async,
        description: spec.description,
    });
    pending.push((id, spec.transitions));

    for child in spec.children {
        check_name(definition, Some(id), &child.name)?;
        let child_id = flatten(definition, child, Some(id), pending)?;
        definition.nodes[id.0].children.push(child_id);
    }
    Ok(id)
}

fn resolve_transition(
    definition: &mut ProcessDefinition,
    from: NodeId,
    spec: TransitionSpec,
) -> Result<()> {
    let scope = definition.node(from).parent;
    let to = definition.resolve_path(scope, &spec.to).ok_or_else(|| {
        ProcessError::configuration(format!(
            "transition from '{}' has unresolved destination '{}'",
            definition.full_name(from),
            spec.to
        ))
    })?;

    let destination = definition.node(to);
    if destination.is_super_state() && destination.children.is_empty() {
        return Err(ProcessError::configuration(format!(
            "transition from '{}' targets superstate '{}' which has no nodes",
            definition.full_name(from),
            definition.full_name(to)
        )));
    }

    if let Some(name) = &spec.name {
        let duplicate = definition
            .node(from)
            .leaving
            .iter()
            .any(|t| definition.transition(*t).name.as_deref() == Some(name.as_str()));
        if duplicate {
            return Err(ProcessError::configuration(format!(
                "node '{}' has more than one leaving transition named '{}'",
                definition.full_name(from),
                name
            )));
        }
    }

    let id = TransitionId(definition.transitions.len());
    let condition_enforced = !matches!(definition.node(from).kind, NodeKind::Decision(_));
    let transition_scope = definition
        .ancestors(from)
        .find(|ancestor| definition.contains(*ancestor, to));

    let mut events = Events::default();
    for action in spec.actions {
        events.add_action(EventType::Transition, action);
    }

    definition.transitions.push(Transition {
        id,
        name: spec.name,
        from,
        to,
        condition: spec.condition,
        condition_enforced,
        events,
        scope: transition_scope,
        description: spec.description,
    });
    definition.nodes[from.0].leaving.push(id);
    definition.nodes[to.0].arriving.push(id);
    Ok(())
}

fn validate(definition: &mut ProcessDefinition) -> Result<()> {
    let starts: Vec<NodeId> = definition
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Start))
        .map(|n| n.id)
        .collect();
    if starts.len() > 1 {
        return Err(ProcessError::configuration(format!(
            "process '{}' declares {} start nodes",
            definition.name,
            starts.len()
        )));
    }
    if let Some(&start) = starts.first() {
        let node = definition.node(start);
        if node.parent.is_some() {
            return Err(ProcessError::configuration(format!(
                "start node '{}' must be declared at process scope",
                definition.full_name(start)
            )));
        }
        if !node.arriving.is_empty() {
            return Err(ProcessError::configuration(format!(
                "start node '{}' cannot have arriving transitions",
                node.name
            )));
        }
        definition.start_state = Some(start);
    }

    for node in &definition.nodes {
        let requires_default = match &node.kind {
            NodeKind::Start | NodeKind::Join(_) | NodeKind::Merge(_) => true,
            NodeKind::Plain(config) => config.action.is_none(),
            _ => false,
        };
        if requires_default && definition.default_leaving_transition(node.id).is_none() {
            return Err(ProcessError::configuration(format!(
                "{} node '{}' has no default leaving transition",
                node.kind.type_name(),
                definition.full_name(node.id)
            )));
        }

        match &node.kind {
            NodeKind::InterleaveEnd => {
                for required in ["back", "done"] {
                    if definition.leaving_transition(node.id, required).is_none() {
                        return Err(ProcessError::configuration(format!(
                            "interleave end '{}' needs a leaving transition named '{}'",
                            definition.full_name(node.id),
                            required
                        )));
                    }
                }
            }
            NodeKind::InterleaveStart(_) => {
                let named = node
                    .leaving
                    .iter()
                    .any(|t| definition.transition(*t).name.is_some());
                if !named {
                    return Err(ProcessError::configuration(format!(
                        "interleave start '{}' needs named leaving transitions",
                        definition.full_name(node.id)
                    )));
                }
            }
            NodeKind::Fork(config) if config.script.is_none() && node.leaving.is_empty() => {
                return Err(ProcessError::configuration(format!(
                    "fork '{}' has no leaving transitions",
                    definition.full_name(node.id)
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_config_error(builder: ProcessDefinitionBuilder, fragment: &str) {
        match builder.build() {
            Err(ProcessError::Configuration(message)) => {
                assert!(
                    message.contains(fragment),
                    "'{}' does not mention '{}'",
                    message,
                    fragment
                );
            }
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unresolved_destination() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::start("start").to("nowhere"))
            .add_node(NodeSpec::end("end"));
        expect_config_error(builder, "unresolved destination 'nowhere'");
    }

    #[test]
    fn test_duplicate_names() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::state("a"))
            .add_node(NodeSpec::state("a"));
        expect_config_error(builder, "duplicate node name 'a'");

        let mut builder = ProcessDefinition::builder("p");
        builder.add_node(
            NodeSpec::super_state("s")
                .child(NodeSpec::state("x"))
                .child(NodeSpec::state("x")),
        );
        expect_config_error(builder, "duplicate node name 'x' in s");

        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(
                NodeSpec::state("a")
                    .transition_named("go", "b")
                    .transition_named("go", "b"),
            )
            .add_node(NodeSpec::state("b"));
        expect_config_error(builder, "more than one leaving transition named 'go'");
    }

    #[test]
    fn test_same_name_in_different_scopes() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::state("x"))
            .add_node(NodeSpec::super_state("s").child(NodeSpec::state("x")));
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_missing_default_transition() {
        let mut builder = ProcessDefinition::builder("p");
        builder.add_node(NodeSpec::start("start"));
        expect_config_error(builder, "start node 'start' has no default leaving transition");

        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::join("join").transition(TransitionSpec::to("end").condition("#{x}")))
            .add_node(NodeSpec::end("end"));
        expect_config_error(builder, "join node 'join'");
    }

    #[test]
    fn test_default_inherited_from_superstate_satisfies_validation() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(
                NodeSpec::super_state("s")
                    .child(NodeSpec::node("pass"))
                    .to("end"),
            )
            .add_node(NodeSpec::end("end"));
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_empty_superstate_destination() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::start("start").to("s"))
            .add_node(NodeSpec::super_state("s"));
        expect_config_error(builder, "has no nodes");
    }

    #[test]
    fn test_start_constraints() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::start("start").to("a"))
            .add_node(NodeSpec::state("a").to("start"));
        expect_config_error(builder, "cannot have arriving transitions");

        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::start("one").to("end"))
            .add_node(NodeSpec::start("two").to("end"))
            .add_node(NodeSpec::end("end"));
        expect_config_error(builder, "2 start nodes");
    }

    #[test]
    fn test_interleave_end_requires_back_and_done() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::interleave_start("start").transition_named("x", "end"))
            .add_node(NodeSpec::interleave_end("end").transition_named("back", "start"));
        expect_config_error(builder, "named 'done'");
    }

    #[test]
    fn test_children_only_on_superstates() {
        let mut builder = ProcessDefinition::builder("p");
        builder.add_node(NodeSpec::state("a").child(NodeSpec::state("b")));
        expect_config_error(builder, "cannot contain nodes");
    }

    #[test]
    fn test_incremental_construction() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(NodeSpec::start("start"))
            .add_node(NodeSpec::super_state("outer"))
            .add_node(NodeSpec::end("end"));
        builder
            .add_node_in("outer", NodeSpec::super_state("inner"))
            .unwrap()
            .add_node_in("/outer/inner", NodeSpec::state("wait"))
            .unwrap()
            .add_transition("start", TransitionSpec::to("outer/inner/wait"))
            .unwrap()
            .add_transition("outer/inner/wait", TransitionSpec::to("../../end"))
            .unwrap();
        assert!(builder.add_node_in("start", NodeSpec::state("x")).is_err());
        assert!(builder
            .add_transition("missing", TransitionSpec::to("end"))
            .is_err());

        let definition = builder.build().unwrap();
        let wait = definition.find_node_id("outer/inner/wait").unwrap();
        let leaving = definition.default_leaving_transition(wait).unwrap();
        assert_eq!(
            definition.transition(leaving).to(),
            definition.find_node_id("end").unwrap()
        );
        assert_eq!(definition.transition(leaving).scope(), None);
    }

    #[test]
    fn test_decision_transitions_are_not_enforced() {
        let mut builder = ProcessDefinition::builder("p");
        builder
            .add_node(
                NodeSpec::decision("d")
                    .transition(TransitionSpec::to("a").named("a").condition("#{x}"))
                    .to("b"),
            )
            .add_node(NodeSpec::state("a").transition(TransitionSpec::to("b").condition("#{y}")))
            .add_node(NodeSpec::state("b"));
        let definition = builder.build().unwrap();
        assert!(definition
            .transitions()
            .filter(|t| definition.node(t.from()).name() == "d")
            .all(|t| !t.is_condition_enforced()));
        let from_a = definition.node(definition.find_node_id("a").unwrap());
        assert!(definition
            .transition(from_a.leaving_transitions()[0])
            .is_condition_enforced());
    }

    #[test]
    fn test_transition_scope_is_innermost_common_superstate() {
        let mut builder = ProcessDefinition::builder("p");
        builder.add_node(
            NodeSpec::super_state("outer")
                .child(NodeSpec::super_state("left").child(NodeSpec::state("a").to("../right/b")))
                .child(NodeSpec::super_state("right").child(NodeSpec::state("b"))),
        );
        let definition = builder.build().unwrap();
        let a = definition.find_node_id("outer/left/a").unwrap();
        let t = definition.node(a).leaving_transitions()[0];
        assert_eq!(
            definition.transition(t).scope(),
            definition.find_node_id("outer")
        );
    }
}
