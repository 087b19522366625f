//! Graph nodes and their kind-specific configuration

use crate::delegation::{DecisionHandler, FirstSelector, Script, TransitionSelector};
use crate::event::{Action, Events};
use crate::exception::ExceptionHandler;
use crate::transition::TransitionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable index of a node inside its [`ProcessDefinition`](crate::definition::ProcessDefinition)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Default name of the token-local variable holding interleave state
pub const DEFAULT_INTERLEAVE_VARIABLE: &str = "interleave-transition-names";

/// A vertex of the process graph
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) leaving: Vec<TransitionId>,
    pub(crate) arriving: Vec<TransitionId>,
    pub(crate) events: Events,
    pub(crate) exception_handlers: Vec<ExceptionHandler>,
    pub(crate) is_async: bool,
    pub(crate) description: Option<String>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Name, unique within the enclosing scope
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Enclosing superstate, `None` at process scope
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes of a superstate in declaration order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn leaving_transitions(&self) -> &[TransitionId] {
        &self.leaving
    }

    pub fn arriving_transitions(&self) -> &[TransitionId] {
        &self.arriving
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_super_state(&self) -> bool {
        matches!(self.kind, NodeKind::SuperState)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind.type_name())
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("leaving", &self.leaving)
            .field("is_async", &self.is_async)
            .finish()
    }
}

/// Closed set of node behaviors
#[derive(Clone)]
pub enum NodeKind {
    /// Initial wait state; cannot be entered by a transition
    Start,
    End(EndConfig),
    /// Wait state
    State,
    /// Runs its action, or passes through over the default transition
    Plain(PlainConfig),
    Decision(DecisionConfig),
    Fork(ForkConfig),
    Join(JoinConfig),
    Merge(MergeConfig),
    InterleaveStart(InterleaveConfig),
    InterleaveEnd,
    Task(TaskConfig),
    SubProcess(SubProcessConfig),
    /// Composite scope owning child nodes
    SuperState,
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End(_) => "end",
            Self::State => "state",
            Self::Plain(_) => "node",
            Self::Decision(_) => "decision",
            Self::Fork(_) => "fork",
            Self::Join(_) => "join",
            Self::Merge(_) => "merge",
            Self::InterleaveStart(_) => "interleave-start",
            Self::InterleaveEnd => "interleave-end",
            Self::Task(_) => "task",
            Self::SubProcess(_) => "sub-process",
            Self::SuperState => "super-state",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EndConfig {
    /// End the whole process instance instead of just the arriving token
    pub ends_process: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PlainConfig {
    pub action: Option<Action>,
}

/// Transition selection for a decision
///
/// Checked in order: `handler`, `expression`, `conditions`, then the inline
/// conditions of the leaving transitions.
#[derive(Clone, Default)]
pub struct DecisionConfig {
    pub handler: Option<Arc<dyn DecisionHandler>>,
    pub expression: Option<String>,
    pub conditions: Vec<DecisionCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionCondition {
    pub expression: String,
    pub transition: String,
}

#[derive(Clone, Default)]
pub struct ForkConfig {
    /// Script whose single collection output names the transitions to fork over
    pub script: Option<Arc<dyn Script>>,
}

#[derive(Clone, Default)]
pub struct JoinConfig {
    /// Reactivate the parent on the first arrival
    pub discriminator: bool,
    /// Reactivate once every named sibling has arrived
    pub token_names: Option<Vec<String>>,
    pub script: Option<Arc<dyn Script>>,
    /// Reactivate once this many siblings sit on the join
    pub n_out_of_m: Option<usize>,
    /// Overrides the engine's default join lock mode
    pub parent_lock_mode: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeConfig {
    pub synchronized: bool,
}

#[derive(Clone)]
pub struct InterleaveConfig {
    pub variable: String,
    pub selector: Arc<dyn TransitionSelector>,
}

impl Default for InterleaveConfig {
    fn default() -> Self {
        Self {
            variable: DEFAULT_INTERLEAVE_VARIABLE.to_string(),
            selector: Arc::new(FirstSelector),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskConfig {
    /// Task names handed to the task manager
    pub tasks: Vec<String>,
    /// Refuse to leave while tasks are unfinished
    pub blocking: bool,
    /// Cancel open tasks when the token leaves
    pub end_tasks: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SubProcessConfig {
    pub name: String,
    /// `None` resolves the latest version
    pub version: Option<u32>,
    pub mappings: Vec<VariableMapping>,
    /// Dispatch a `StartSubProcess` message instead of starting inline
    pub is_async: bool,
}

/// Copies a variable between a super-process token and its sub-process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableMapping {
    /// Variable in the super process
    pub variable: String,
    /// Variable in the sub process
    pub mapped_name: String,
    /// Copy in when the sub-process starts
    pub read: bool,
    /// Copy out when the sub-process ends
    pub write: bool,
}

impl VariableMapping {
    /// Read-write mapping under the same name
    pub fn read_write(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            variable: name.clone(),
            mapped_name: name,
            read: true,
            write: true,
        }
    }
}
