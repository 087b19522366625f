//! Events and actions attached to graph elements
//!
//! Every graph element (the process definition, a node, a transition) carries
//! an [`Events`] table mapping an [`EventType`] to an ordered list of
//! [`Action`]s. When the engine fires an event, the element's own actions run
//! first and the event then propagates outward through the enclosing scopes
//! according to [`EventType::propagation`].

use crate::context::ExecutionContext;
use crate::error::Result;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Lifecycle event types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    ProcessStart,
    ProcessEnd,
    BeforeSignal,
    AfterSignal,
    NodeEnter,
    NodeLeave,
    SuperStateEnter,
    SuperStateLeave,
    Transition,
    SubProcessCreated,
    SubProcessEnd,
    /// Host-defined event, fired only by host code
    Custom(String),
}

/// How far an event travels after the firing element's own actions ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Only the immediately enclosing superstate, never the process definition
    EnclosingSuperState,
    /// Every enclosing superstate, then the process definition
    AllScopes,
}

impl EventType {
    /// Canonical event name
    pub fn as_str(&self) -> &str {
        match self {
            Self::ProcessStart => "process-start",
            Self::ProcessEnd => "process-end",
            Self::BeforeSignal => "before-signal",
            Self::AfterSignal => "after-signal",
            Self::NodeEnter => "node-enter",
            Self::NodeLeave => "node-leave",
            Self::SuperStateEnter => "superstate-enter",
            Self::SuperStateLeave => "superstate-leave",
            Self::Transition => "transition",
            Self::SubProcessCreated => "subprocess-created",
            Self::SubProcessEnd => "subprocess-end",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Map an event name to its type; unknown names become [`EventType::Custom`]
    pub fn from_name(name: &str) -> Self {
        match name {
            "process-start" => Self::ProcessStart,
            "process-end" => Self::ProcessEnd,
            "before-signal" => Self::BeforeSignal,
            "after-signal" => Self::AfterSignal,
            "node-enter" => Self::NodeEnter,
            "node-leave" => Self::NodeLeave,
            "superstate-enter" => Self::SuperStateEnter,
            "superstate-leave" => Self::SuperStateLeave,
            "transition" => Self::Transition,
            "subprocess-created" => Self::SubProcessCreated,
            "subprocess-end" => Self::SubProcessEnd,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn propagation(&self) -> Propagation {
        match self {
            Self::NodeEnter | Self::NodeLeave | Self::BeforeSignal | Self::AfterSignal => {
                Propagation::EnclosingSuperState
            }
            _ => Propagation::AllScopes,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

/// User behavior invoked when an event fires
///
/// Returning an error hands it to the exception-handler chain of the element
/// whose event list holds the action.
pub trait ActionHandler: Send + Sync {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<()>;
}

struct FnAction<F>(F);

impl<F> ActionHandler for FnAction<F>
where
    F: Fn(&mut ExecutionContext<'_>) -> Result<()> + Send + Sync,
{
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// An action registered on an event, an exception handler or a plain node
#[derive(Clone)]
pub struct Action {
    pub(crate) name: Option<String>,
    pub(crate) handler: Arc<dyn ActionHandler>,
    pub(crate) propagation_allowed: bool,
    pub(crate) is_async: bool,
}

impl Action {
    pub fn new(handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            name: None,
            handler,
            propagation_allowed: true,
            is_async: false,
        }
    }

    /// Wrap a closure as an action
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::new(Arc::new(FnAction(f)))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Do not run this action for events propagated from nested elements
    pub fn without_propagation(mut self) -> Self {
        self.propagation_allowed = false;
        self
    }

    /// Dispatch as an `ExecuteAction` message instead of running inline
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_propagation_allowed(&self) -> bool {
        self.propagation_allowed
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub(crate) fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        self.handler.execute(ctx)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("propagation_allowed", &self.propagation_allowed)
            .field("is_async", &self.is_async)
            .finish()
    }
}

/// One event type with its ordered actions
#[derive(Debug, Clone)]
pub struct Event {
    pub(crate) event_type: EventType,
    pub(crate) actions: Vec<Action>,
}

impl Event {
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

/// Event table of a graph element
#[derive(Debug, Clone, Default)]
pub struct Events {
    events: Vec<Event>,
}

impl Events {
    pub fn add_action(&mut self, event_type: EventType, action: Action) {
        match self.events.iter_mut().find(|e| e.event_type == event_type) {
            Some(event) => event.actions.push(action),
            None => self.events.push(Event {
                event_type,
                actions: vec![action],
            }),
        }
    }

    pub fn get(&self, event_type: &EventType) -> Option<&Event> {
        self.events.iter().find(|e| &e.event_type == event_type)
    }

    /// Actions registered for `event_type`, empty if none
    pub fn actions(&self, event_type: &EventType) -> &[Action] {
        self.get(event_type).map(|e| e.actions.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
