//! Immutable process graphs
//!
//! A [`ProcessDefinition`] owns two arenas, nodes and transitions, addressed by
//! [`NodeId`] and [`TransitionId`]. Superstates nest further nodes; the
//! containment tree is expressed through `parent`/`children` ids rather than
//! owning pointers, which keeps the definition freely shareable as
//! `Arc<ProcessDefinition>` across instances.
//!
//! # Paths
//!
//! Nodes are addressed by `/`-separated paths. Relative paths are resolved
//! against a scope (the superstate containing the node that declares the
//! path):
//!
//! | path | meaning |
//! |---|---|
//! | `name` | sibling in the same scope |
//! | `a/b` | descend into superstate `a` |
//! | `../name` | one scope up (repeatable) |
//! | `/a/b` | absolute, from process scope |

use crate::builder::ProcessDefinitionBuilder;
use crate::event::{EventType, Events, Propagation};
use crate::exception::ExceptionHandler;
use crate::node::{Node, NodeId, NodeKind};
use crate::transition::{Transition, TransitionId};
use serde::{Deserialize, Serialize};

/// Any element that can carry events and exception handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphElementRef {
    Process,
    Node(NodeId),
    Transition(TransitionId),
}

#[derive(Debug)]
pub struct ProcessDefinition {
    pub(crate) name: String,
    pub(crate) version: u32,
    pub(crate) description: Option<String>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) top_level: Vec<NodeId>,
    pub(crate) start_state: Option<NodeId>,
    pub(crate) events: Events,
    pub(crate) exception_handlers: Vec<ExceptionHandler>,
}

impl ProcessDefinition {
    /// Start building a definition
    pub fn builder(name: impl Into<String>) -> ProcessDefinitionBuilder {
        ProcessDefinitionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The start node, if the process declares one
    pub fn start_state(&self) -> Option<NodeId> {
        self.start_state
    }

    pub fn top_level_nodes(&self) -> &[NodeId] {
        &self.top_level
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }

    /// Node by id
    ///
    /// Ids are only ever handed out by this definition, so an id from another
    /// definition is a programming error.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }

    /// Look up a node by absolute path (`"outer/inner/task"`, leading `/` optional)
    pub fn find_node(&self, path: &str) -> Option<&Node> {
        self.find_node_id(path).map(|id| self.node(id))
    }

    pub fn find_node_id(&self, path: &str) -> Option<NodeId> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return None;
        }
        path.split('/')
            .try_fold(None, |scope, segment| self.child_named(scope, segment).map(Some))
            .flatten()
    }

    /// Resolve `path` relative to `scope` (`None` = process scope)
    pub fn resolve_path(&self, scope: Option<NodeId>, path: &str) -> Option<NodeId> {
        if path.starts_with('/') {
            return self.find_node_id(path);
        }
        let mut scope = scope;
        let mut found = None;
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    let current = scope?;
                    scope = self.node(current).parent;
                    found = None;
                }
                name => {
                    let id = self.child_named(scope, name)?;
                    scope = Some(id);
                    found = Some(id);
                }
            }
        }
        found
    }

    /// Direct child of `scope` with the given name
    pub fn child_named(&self, scope: Option<NodeId>, name: &str) -> Option<NodeId> {
        let candidates = match scope {
            Some(id) => &self.node(id).children,
            None => &self.top_level,
        };
        candidates
            .iter()
            .copied()
            .find(|id| self.node(*id).name == name)
    }

    /// Absolute path of a node, e.g. `outer/inner/task`
    pub fn full_name(&self, id: NodeId) -> String {
        let mut names: Vec<&str> = self
            .ancestors(id)
            .map(|a| self.node(a).name.as_str())
            .collect();
        names.reverse();
        names.push(&self.node(id).name);
        names.join("/")
    }

    /// Enclosing superstates of a node, innermost first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, move |p| self.node(*p).parent)
    }

    /// Whether `scope` encloses `id` (directly or transitively)
    pub fn contains(&self, scope: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == scope)
    }

    /// The node a token really lands on when entering `id`
    ///
    /// Entering a superstate enters its first child, recursively.
    pub fn first_leaf(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(first) = self.node(current).children.first() {
            current = *first;
        }
        current
    }

    /// Leaving transition by name, inherited from enclosing superstates
    pub fn leaving_transition(&self, node: NodeId, name: &str) -> Option<TransitionId> {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .find_map(|scope| {
                self.node(scope)
                    .leaving
                    .iter()
                    .copied()
                    .find(|t| self.transition(*t).name.as_deref() == Some(name))
            })
    }

    /// The first declared leaving transition without a condition
    ///
    /// A node with no such transition inherits the default of its enclosing
    /// superstate.
    pub fn default_leaving_transition(&self, node: NodeId) -> Option<TransitionId> {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .find_map(|scope| {
                self.node(scope)
                    .leaving
                    .iter()
                    .copied()
                    .find(|t| self.transition(*t).condition.is_none())
            })
    }

    /// Containing element used for exception-handler lookup
    pub fn parent_element(&self, element: GraphElementRef) -> Option<GraphElementRef> {
        match element {
            GraphElementRef::Process => None,
            GraphElementRef::Node(id) => Some(
                self.node(id)
                    .parent
                    .map(GraphElementRef::Node)
                    .unwrap_or(GraphElementRef::Process),
            ),
            GraphElementRef::Transition(id) => Some(
                self.transition(id)
                    .scope
                    .map(GraphElementRef::Node)
                    .unwrap_or(GraphElementRef::Process),
            ),
        }
    }

    /// Elements an event fired on `element` visits, starting with `element`
    pub fn propagation_chain(
        &self,
        element: GraphElementRef,
        event_type: &EventType,
    ) -> Vec<GraphElementRef> {
        let mut chain = vec![element];
        match event_type.propagation() {
            Propagation::EnclosingSuperState => {
                if let Some(GraphElementRef::Node(scope)) = self.parent_element(element) {
                    chain.push(GraphElementRef::Node(scope));
                }
            }
            Propagation::AllScopes => {
                let mut current = element;
                while let Some(parent) = self.parent_element(current) {
                    chain.push(parent);
                    current = parent;
                }
            }
        }
        chain
    }

    pub fn events_of(&self, element: GraphElementRef) -> &Events {
        match element {
            GraphElementRef::Process => &self.events,
            GraphElementRef::Node(id) => &self.node(id).events,
            GraphElementRef::Transition(id) => &self.transition(id).events,
        }
    }

    /// Exception handlers of an element; transitions carry none
    pub fn exception_handlers_of(&self, element: GraphElementRef) -> &[ExceptionHandler] {
        match element {
            GraphElementRef::Process => &self.exception_handlers,
            GraphElementRef::Node(id) => &self.node(id).exception_handlers,
            GraphElementRef::Transition(_) => &[],
        }
    }

    /// Human readable element description for errors and logs
    pub fn element_name(&self, element: GraphElementRef) -> String {
        match element {
            GraphElementRef::Process => format!("process '{}'", self.name),
            GraphElementRef::Node(id) => format!("node '{}'", self.full_name(id)),
            GraphElementRef::Transition(id) => {
                let transition = self.transition(id);
                format!(
                    "transition '{}' ({} -> {})",
                    transition.name.as_deref().unwrap_or(""),
                    self.full_name(transition.from),
                    self.full_name(transition.to)
                )
            }
        }
    }

    pub(crate) fn is_kind(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> bool {
        pred(&self.node(id).kind)
    }
}
