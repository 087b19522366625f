//! Directed edges between nodes

use crate::event::Events;
use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// Stable index of a transition inside its definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionId(pub(crate) usize);

impl TransitionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct Transition {
    pub(crate) id: TransitionId,
    pub(crate) name: Option<String>,
    pub(crate) from: NodeId,
    pub(crate) to: NodeId,
    pub(crate) condition: Option<String>,
    /// Cleared for transitions leaving a decision, which evaluates them itself
    pub(crate) condition_enforced: bool,
    pub(crate) events: Events,
    /// Innermost superstate containing both endpoints
    pub(crate) scope: Option<NodeId>,
    pub(crate) description: Option<String>,
}

impl Transition {
    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn is_condition_enforced(&self) -> bool {
        self.condition_enforced
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn scope(&self) -> Option<NodeId> {
        self.scope
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}
