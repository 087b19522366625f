//! Call-scoped execution state handed to user behavior
//!
//! An [`ExecutionContext`] lives for one control-flow pass. It borrows the
//! instance mutably and records which token is moving, which event is being
//! fired and where it came from, the transition being taken, and the exception
//! being handled. It is never persisted.

use crate::definition::{GraphElementRef, ProcessDefinition};
use crate::delegation::{EvalValue, ExpectedType};
use crate::engine;
use crate::error::{ProcessError, Result};
use crate::event::EventType;
use crate::exception::Exception;
use crate::instance::ProcessInstance;
use crate::node::{Node, NodeId};
use crate::services::Services;
use crate::token::{Token, TokenId};
use crate::transition::{Transition, TransitionId};
use serde_json::Value;
use std::sync::Arc;

pub struct ExecutionContext<'a> {
    pub(crate) instance: &'a mut ProcessInstance,
    token: TokenId,
    pub(crate) event: Option<EventType>,
    pub(crate) event_source: Option<GraphElementRef>,
    pub(crate) graph_element: Option<GraphElementRef>,
    pub(crate) transition: Option<TransitionId>,
    pub(crate) transition_source: Option<NodeId>,
    pub(crate) exception: Option<Exception>,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(instance: &'a mut ProcessInstance, token: TokenId) -> Self {
        Self {
            instance,
            token,
            event: None,
            event_source: None,
            graph_element: None,
            transition: None,
            transition_source: None,
            exception: None,
        }
    }

    /// Fresh context for another token of the same instance
    pub(crate) fn for_token(&mut self, token: TokenId) -> ExecutionContext<'_> {
        ExecutionContext::new(&mut *self.instance, token)
    }

    pub fn token_id(&self) -> TokenId {
        self.token
    }

    pub fn token(&self) -> &Token {
        self.instance.tokens.at(self.token)
    }

    pub(crate) fn token_mut(&mut self) -> &mut Token {
        self.instance.tokens.at_mut(self.token)
    }

    /// Full name of the current token (`/` for the root)
    pub fn token_name(&self) -> String {
        self.instance.tokens.full_name(self.token)
    }

    pub fn instance(&self) -> &ProcessInstance {
        &*self.instance
    }

    pub fn definition(&self) -> &ProcessDefinition {
        self.instance.definition()
    }

    pub(crate) fn definition_arc(&self) -> Arc<ProcessDefinition> {
        Arc::clone(self.instance.definition())
    }

    pub fn services(&self) -> &Services {
        self.instance.services()
    }

    pub(crate) fn services_arc(&self) -> Arc<Services> {
        Arc::clone(self.instance.services())
    }

    /// Node the current token sits on
    pub fn node(&self) -> Option<&Node> {
        self.token().node.map(|id| self.definition().node(id))
    }

    /// Event currently being fired
    pub fn event(&self) -> Option<&EventType> {
        self.event.as_ref()
    }

    /// Element the current event was originally fired on
    pub fn event_source(&self) -> Option<GraphElementRef> {
        self.event_source
    }

    /// Element whose action list is executing (changes while an event propagates)
    pub fn graph_element(&self) -> Option<GraphElementRef> {
        self.graph_element
    }

    /// Transition being taken, while leaving a node
    pub fn transition(&self) -> Option<&Transition> {
        self.transition.map(|id| self.definition().transition(id))
    }

    pub fn transition_source(&self) -> Option<NodeId> {
        self.transition_source
    }

    /// Exception being handled, inside exception-handler actions
    pub fn exception(&self) -> Option<&Exception> {
        self.exception.as_ref()
    }

    /// Variable visible from the current token
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.instance.variable_for(self.token, name)
    }

    /// Update the nearest scope defining `name`, else the root scope
    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.instance.set_variable_for(self.token, name, value);
    }

    /// Set a variable on the current token only
    pub fn set_local_variable(&mut self, name: &str, value: Value) {
        self.instance.variables.set(self.token, name, value);
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        self.instance.remove_variable_for(self.token, name)
    }

    pub fn evaluate(&self, expression: &str, expected: ExpectedType) -> Result<EvalValue> {
        let evaluator = Arc::clone(&self.services().evaluator);
        evaluator.evaluate(expression, self, expected)
    }

    /// Move the current token out of its node
    ///
    /// With a name the transition is looked up on the node and its enclosing
    /// superstates; without one the default transition is taken.
    pub fn leave_node(&mut self, transition: Option<&str>) -> Result<()> {
        let node = self.token().node.ok_or_else(|| {
            ProcessError::illegal_state(format!("token '{}' is not on a node", self.token_name()))
        })?;
        let definition = self.definition_arc();
        let transition = match transition {
            Some(name) => definition.leaving_transition(node, name).ok_or_else(|| {
                ProcessError::illegal_state(format!(
                    "node '{}' has no leaving transition named '{}'",
                    definition.full_name(node),
                    name
                ))
            })?,
            None => definition.default_leaving_transition(node).ok_or_else(|| {
                ProcessError::configuration(format!(
                    "node '{}' has no default leaving transition",
                    definition.full_name(node)
                ))
            })?,
        };
        engine::leave(self, node, transition)
    }

    /// Fire a custom event on an element from inside an action
    pub fn fire_event(&mut self, element: GraphElementRef, event_type: EventType) -> Result<()> {
        engine::propagation::fire_event(self, element, event_type)
    }
}
