//! Process instances: one execution of a definition
//!
//! A [`ProcessInstance`] owns its token tree and variable store and shares the
//! immutable definition and services with every other instance. All public
//! operations are synchronous: a call returns once every token it moved has
//! reached a wait state or ended.
//!
//! The kernel does no locking of its own. Hosts that drive one instance from
//! several threads serialize the calls, for example with one mutex per
//! instance.
//!
//! # Example
//!
//! ```rust
//! use procflow_core::builder::NodeSpec;
//! use procflow_core::definition::ProcessDefinition;
//! use procflow_core::instance::ProcessInstance;
//! use std::sync::Arc;
//!
//! let mut builder = ProcessDefinition::builder("approval");
//! builder
//!     .add_node(NodeSpec::start("start").to("review"))
//!     .add_node(NodeSpec::state("review").to("done"))
//!     .add_node(NodeSpec::end("done"));
//! let definition = Arc::new(builder.build().unwrap());
//!
//! let mut instance = ProcessInstance::new(definition).unwrap();
//! instance.signal().unwrap();
//! assert_eq!(instance.node_name(instance.root_token()).as_deref(), Some("review"));
//! instance.signal().unwrap();
//! assert!(instance.has_ended());
//! ```

use crate::context::ExecutionContext;
use crate::definition::{GraphElementRef, ProcessDefinition};
use crate::engine::{self, propagation};
use crate::error::{ProcessError, Result};
use crate::event::EventType;
use crate::node::{Node, NodeId, NodeKind};
use crate::nodes;
use crate::services::{InstanceId, Services};
use crate::token::{Token, TokenId, TokenTree};
use crate::variables::{InMemoryVariableStore, VariableStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Link from a sub-process instance back to the token that started it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperProcessRef {
    pub instance: InstanceId,
    pub token: TokenId,
}

pub struct ProcessInstance {
    pub(crate) id: InstanceId,
    pub(crate) key: Option<String>,
    pub(crate) definition: Arc<ProcessDefinition>,
    pub(crate) services: Arc<Services>,
    pub(crate) tokens: TokenTree,
    pub(crate) variables: Box<dyn VariableStore>,
    pub(crate) start: DateTime<Utc>,
    pub(crate) end: Option<DateTime<Utc>>,
    pub(crate) suspended: bool,
    pub(crate) super_process: Option<SuperProcessRef>,
    /// `(token, node)` pairs of the signals currently on the call stack
    pub(crate) signal_frames: Vec<(TokenId, NodeId)>,
    /// Transitions taken since the last public entry point
    pub(crate) steps: usize,
}

/// Options for starting an instance
pub struct InstanceBuilder {
    definition: Arc<ProcessDefinition>,
    services: Option<Arc<Services>>,
    key: Option<String>,
    variables: Vec<(String, Value)>,
    store: Option<Box<dyn VariableStore>>,
}

impl InstanceBuilder {
    pub fn services(mut self, services: Arc<Services>) -> Self {
        self.services = Some(services);
        self
    }

    /// Business key, e.g. an order number
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Root-scope variable set before the process starts
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.push((name.into(), value));
        self
    }

    pub fn variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn variable_store(mut self, store: Box<dyn VariableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Create the instance and run it up to its first wait state
    pub fn start(self) -> Result<ProcessInstance> {
        let services = self.services.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| Box::new(InMemoryVariableStore::new()));
        let mut instance = ProcessInstance::create(self.definition, services, store);
        instance.key = self.key;
        let root = instance.tokens.root();
        for (name, value) in self.variables {
            instance.variables.set(root, &name, value);
        }
        instance.begin()?;
        Ok(instance)
    }
}

impl ProcessInstance {
    /// Start an instance with default services
    pub fn new(definition: Arc<ProcessDefinition>) -> Result<Self> {
        Self::builder(definition).start()
    }

    pub fn with_services(definition: Arc<ProcessDefinition>, services: Arc<Services>) -> Result<Self> {
        Self::builder(definition).services(services).start()
    }

    pub fn builder(definition: Arc<ProcessDefinition>) -> InstanceBuilder {
        InstanceBuilder {
            definition,
            services: None,
            key: None,
            variables: Vec::new(),
            store: None,
        }
    }

    /// Instance with a root token that has not been placed yet
    pub(crate) fn create(
        definition: Arc<ProcessDefinition>,
        services: Arc<Services>,
        variables: Box<dyn VariableStore>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: None,
            definition,
            services,
            tokens: TokenTree::new(),
            variables,
            start: Utc::now(),
            end: None,
            suspended: false,
            super_process: None,
            signal_frames: Vec::new(),
            steps: 0,
        }
    }

    /// Place the root token and fire `process-start`
    ///
    /// Without a start node the first top-level node is entered and executed.
    pub(crate) fn begin(&mut self) -> Result<()> {
        self.steps = 0;
        let definition = Arc::clone(&self.definition);
        let root = self.tokens.root();
        tracing::debug!(
            instance = %self.id,
            process = %definition.name(),
            version = definition.version(),
            "Starting process instance"
        );

        let mut ctx = ExecutionContext::new(self, root);
        match definition.start_state() {
            Some(start) => {
                let token = ctx.token_mut();
                token.node = Some(start);
                token.node_enter = Some(Utc::now());
                propagation::fire_event(&mut ctx, GraphElementRef::Process, EventType::ProcessStart)
            }
            None => {
                propagation::fire_event(&mut ctx, GraphElementRef::Process, EventType::ProcessStart)?;
                let first = definition.top_level_nodes().first().copied().ok_or_else(|| {
                    ProcessError::configuration(format!(
                        "process '{}' has no nodes",
                        definition.name()
                    ))
                })?;
                let (node, flow) = engine::enter(&mut ctx, first, None)?;
                engine::proceed(&mut ctx, node, flow)
            }
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn definition(&self) -> &Arc<ProcessDefinition> {
        &self.definition
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn has_ended(&self) -> bool {
        self.end.is_some()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn super_process(&self) -> Option<SuperProcessRef> {
        self.super_process
    }

    pub fn root_token(&self) -> TokenId {
        self.tokens.root()
    }

    pub fn tokens(&self) -> &TokenTree {
        &self.tokens
    }

    pub fn token(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(id)
    }

    /// Token by path (`"/"`, `"/to b/to c"`)
    pub fn find_token(&self, path: &str) -> Option<TokenId> {
        self.tokens.find(path)
    }

    /// Node a token currently sits on
    pub fn node_of(&self, token: TokenId) -> Option<&Node> {
        let node = self.tokens.get(token)?.node?;
        Some(self.definition.node(node))
    }

    /// Full path of the node a token sits on
    pub fn node_name(&self, token: TokenId) -> Option<String> {
        let node = self.tokens.get(token)?.node?;
        Some(self.definition.full_name(node))
    }

    fn ensure_active(&self) -> Result<()> {
        if self.has_ended() {
            return Err(ProcessError::illegal_state(format!(
                "process instance {} has ended",
                self.id
            )));
        }
        if self.suspended {
            return Err(ProcessError::illegal_state(format!(
                "process instance {} is suspended",
                self.id
            )));
        }
        Ok(())
    }

    /// Signal the root token over its node's default transition
    pub fn signal(&mut self) -> Result<()> {
        self.signal_token(self.tokens.root(), None)
    }

    /// Signal the root token over a named transition
    pub fn signal_transition(&mut self, transition: &str) -> Result<()> {
        self.signal_token(self.tokens.root(), Some(transition))
    }

    /// Signal a token; `None` takes the default transition
    pub fn signal_token(&mut self, token: TokenId, transition: Option<&str>) -> Result<()> {
        self.ensure_active()?;
        self.tokens.token(token)?;
        self.steps = 0;
        let mut ctx = ExecutionContext::new(self, token);
        engine::signal(&mut ctx, transition)
    }

    /// Signal the token at `path`
    pub fn signal_path(&mut self, path: &str, transition: Option<&str>) -> Result<()> {
        let token = self
            .find_token(path)
            .ok_or_else(|| ProcessError::illegal_state(format!("no token at '{}'", path)))?;
        self.signal_token(token, transition)
    }

    /// End the instance, cascading through every active token
    pub fn end(&mut self) -> Result<()> {
        if self.has_ended() {
            return Ok(());
        }
        self.steps = 0;
        let root = self.tokens.root();
        let mut ctx = ExecutionContext::new(self, root);
        engine::end_token(&mut ctx, root, false)
    }

    /// Block signals to every token, including running sub-processes
    pub fn suspend(&mut self) {
        self.suspended = true;
        let root = self.tokens.root();
        self.set_suspended(root, true);
        tracing::debug!(instance = %self.id, "Process instance suspended");
    }

    pub fn resume(&mut self) {
        self.suspended = false;
        let root = self.tokens.root();
        self.set_suspended(root, false);
        tracing::debug!(instance = %self.id, "Process instance resumed");
    }

    /// Suspend a token and its descendants
    pub fn suspend_token(&mut self, token: TokenId) -> Result<()> {
        self.tokens.token(token)?;
        self.set_suspended(token, true);
        Ok(())
    }

    pub fn resume_token(&mut self, token: TokenId) -> Result<()> {
        self.tokens.token(token)?;
        self.set_suspended(token, false);
        Ok(())
    }

    fn set_suspended(&mut self, token: TokenId, suspended: bool) {
        for id in self.tokens.descendants(token) {
            let token = self.tokens.at_mut(id);
            token.suspended = suspended;
            if let Some(sub) = token.sub_process.as_deref_mut() {
                if suspended {
                    sub.suspend();
                } else {
                    sub.resume();
                }
            }
        }
    }

    /// Lock a token against external signals
    pub fn lock_token(&mut self, token: TokenId, reason: &str) -> Result<()> {
        self.tokens.token_mut(token)?.lock(reason)
    }

    pub fn unlock_token(&mut self, token: TokenId, reason: &str) -> Result<()> {
        self.tokens.token_mut(token)?.unlock(reason)
    }

    /// Root-scope variable
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(self.tokens.root(), name)
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        let root = self.tokens.root();
        self.variables.set(root, name, value);
    }

    /// Variable visible from `token`, walking up to the root
    pub fn token_variable(&self, token: TokenId, name: &str) -> Option<Value> {
        self.variable_for(token, name)
    }

    /// Set on the nearest scope of `token` defining `name`, else the root
    pub fn set_token_variable(&mut self, token: TokenId, name: &str, value: Value) -> Result<()> {
        self.tokens.token(token)?;
        self.set_variable_for(token, name, value);
        Ok(())
    }

    pub fn set_local_variable(&mut self, token: TokenId, name: &str, value: Value) -> Result<()> {
        self.tokens.token(token)?;
        self.variables.set(token, name, value);
        Ok(())
    }

    pub fn remove_variable(&mut self, token: TokenId, name: &str) -> Option<Value> {
        self.remove_variable_for(token, name)
    }

    /// Variables defined directly on a token
    pub fn local_variables(&self, token: TokenId) -> HashMap<String, Value> {
        self.variables.all(token)
    }

    pub(crate) fn variable_for(&self, token: TokenId, name: &str) -> Option<Value> {
        self.tokens
            .lineage(token)
            .find_map(|scope| self.variables.get(scope, name))
    }

    pub(crate) fn set_variable_for(&mut self, token: TokenId, name: &str, value: Value) {
        let scope = self
            .tokens
            .lineage(token)
            .find(|scope| self.variables.contains(*scope, name))
            .unwrap_or_else(|| self.tokens.root());
        self.variables.set(scope, name, value);
    }

    pub(crate) fn remove_variable_for(&mut self, token: TokenId, name: &str) -> Option<Value> {
        let scope = self
            .tokens
            .lineage(token)
            .find(|scope| self.variables.contains(*scope, name))?;
        self.variables.remove(scope, name)
    }

    /// Resume a token parked by an `ExecuteNode` message
    pub fn execute_node(&mut self, token: TokenId) -> Result<()> {
        self.ensure_active()?;
        self.steps = 0;
        let definition = Arc::clone(&self.definition);
        let current = self.tokens.token(token)?;
        if current.has_ended() {
            return Err(ProcessError::illegal_state(format!(
                "token '{}' has ended",
                self.tokens.full_name(token)
            )));
        }
        let node = current.node.ok_or_else(|| {
            ProcessError::illegal_state(format!(
                "token '{}' is not on a node",
                self.tokens.full_name(token)
            ))
        })?;
        self.tokens
            .at_mut(token)
            .unlock(&engine::job_lock_reason(&definition, node))?;

        let mut ctx = ExecutionContext::new(self, token);
        let flow = nodes::execute(&mut ctx, node)?;
        engine::proceed(&mut ctx, node, flow)
    }

    /// Run an action dispatched by an `ExecuteAction` message
    pub fn execute_action(
        &mut self,
        token: TokenId,
        element: GraphElementRef,
        event: EventType,
        action_index: usize,
    ) -> Result<()> {
        self.ensure_active()?;
        self.tokens.token(token)?;
        self.steps = 0;
        let definition = Arc::clone(&self.definition);
        let action = definition
            .events_of(element)
            .actions(&event)
            .get(action_index)
            .ok_or_else(|| {
                ProcessError::illegal_state(format!(
                    "{} has no action {} for event '{}'",
                    definition.element_name(element),
                    action_index,
                    event
                ))
            })?;

        let mut ctx = ExecutionContext::new(self, token);
        ctx.event = Some(event);
        ctx.event_source = Some(element);
        ctx.graph_element = Some(element);
        propagation::run_action(&mut ctx, element, action)
    }

    /// Start a sub-process dispatched by a `StartSubProcess` message
    pub fn start_sub_process(&mut self, token: TokenId) -> Result<()> {
        self.ensure_active()?;
        self.steps = 0;
        let node = self.sub_process_node(token)?;
        let mut ctx = ExecutionContext::new(self, token);
        let flow = nodes::subprocess::start_at(&mut ctx, node)?;
        engine::proceed(&mut ctx, node, flow)
    }

    /// Signal the root token of the sub-process started from `token`
    ///
    /// When the sub-process ends, its write mappings are copied back and the
    /// token continues over its node's default transition.
    pub fn signal_sub_process(&mut self, token: TokenId, transition: Option<&str>) -> Result<()> {
        self.ensure_active()?;
        let sub = self.sub_process_mut(token).ok_or_else(|| {
            ProcessError::illegal_state(format!("token {} has no sub-process", token.index()))
        })?;
        let root = sub.root_token();
        sub.signal_token(root, transition)?;
        self.complete_sub_process(token)
    }

    /// Continue `token` if its sub-process has ended; no-op while it runs
    pub fn complete_sub_process(&mut self, token: TokenId) -> Result<()> {
        self.ensure_active()?;
        let node = self.sub_process_node(token)?;
        let ended = self
            .tokens
            .at(token)
            .sub_process()
            .map(|sub| sub.has_ended())
            .unwrap_or(false);
        if !ended {
            return Ok(());
        }
        self.steps = 0;
        let mut ctx = ExecutionContext::new(self, token);
        let flow = nodes::subprocess::complete_at(&mut ctx, node)?;
        engine::proceed(&mut ctx, node, flow)
    }

    pub fn sub_process(&self, token: TokenId) -> Option<&ProcessInstance> {
        self.tokens.get(token)?.sub_process.as_deref()
    }

    /// Mutable access for hosts driving sub-process tokens directly
    ///
    /// Call [`complete_sub_process`](Self::complete_sub_process) afterwards so
    /// the super-process continues once the sub-process has ended.
    pub fn sub_process_mut(&mut self, token: TokenId) -> Option<&mut ProcessInstance> {
        self.tokens.get_mut(token)?.sub_process.as_deref_mut()
    }

    fn sub_process_node(&self, token: TokenId) -> Result<NodeId> {
        let current = self.tokens.token(token)?;
        match current.node {
            Some(node)
                if !current.has_ended()
                    && self
                        .definition
                        .is_kind(node, |kind| matches!(kind, NodeKind::SubProcess(_))) =>
            {
                Ok(node)
            }
            _ => Err(ProcessError::illegal_state(format!(
                "token '{}' is not waiting in a sub-process node",
                self.tokens.full_name(token)
            ))),
        }
    }
}

impl fmt::Debug for ProcessInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessInstance")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("process", &self.definition.name())
            .field("version", &self.definition.version())
            .field("tokens", &self.tokens.len())
            .field("start", &self.start)
            .field("end", &self.end)
            .field("suspended", &self.suspended)
            .finish()
    }
}
