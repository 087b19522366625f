//! Named user behavior for declarative definitions
//!
//! YAML definitions refer to actions, decision handlers and scripts by name.
//! A [`HandlerRegistry`] maps those names to implementations and is passed
//! explicitly to the loader.
//!
//! ```rust
//! use procflow_core::registry::HandlerRegistry;
//! use serde_json::json;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_action_fn("approve", |ctx| {
//!     ctx.set_variable("approved", json!(true));
//!     Ok(())
//! });
//! assert!(registry.action("approve").is_ok());
//! assert!(registry.action("reject").is_err());
//! ```

use crate::context::ExecutionContext;
use crate::delegation::{decision_fn, script_fn, DecisionHandler, EvalValue, Script};
use crate::error::{ProcessError, Result};
use crate::event::{Action, ActionHandler};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    actions: HashMap<String, Action>,
    decisions: HashMap<String, Arc<dyn DecisionHandler>>,
    scripts: HashMap<String, Arc<dyn Script>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> &mut Self {
        let name = name.into();
        self.actions
            .insert(name.clone(), Action::new(handler).named(name));
        self
    }

    pub fn register_action_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        self.actions
            .insert(name.clone(), Action::from_fn(f).named(name));
        self
    }

    pub fn register_decision(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn DecisionHandler>,
    ) -> &mut Self {
        self.decisions.insert(name.into(), handler);
        self
    }

    pub fn register_decision_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> Result<String> + Send + Sync + 'static,
    {
        self.register_decision(name, Arc::new(decision_fn(f)))
    }

    pub fn register_script(&mut self, name: impl Into<String>, script: Arc<dyn Script>) -> &mut Self {
        self.scripts.insert(name.into(), script);
        self
    }

    pub fn register_script_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&ExecutionContext<'_>) -> Result<HashMap<String, EvalValue>> + Send + Sync + 'static,
    {
        self.register_script(name, Arc::new(script_fn(f)))
    }

    /// Action registered under `name`, named after it
    pub fn action(&self, name: &str) -> Result<Action> {
        self.actions
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessError::configuration(format!("no action registered as '{}'", name)))
    }

    pub fn decision(&self, name: &str) -> Result<Arc<dyn DecisionHandler>> {
        self.decisions.get(name).cloned().ok_or_else(|| {
            ProcessError::configuration(format!("no decision handler registered as '{}'", name))
        })
    }

    pub fn script(&self, name: &str) -> Result<Arc<dyn Script>> {
        self.scripts
            .get(name)
            .cloned()
            .ok_or_else(|| ProcessError::configuration(format!("no script registered as '{}'", name)))
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.decisions.is_empty() && self.scripts.is_empty()
    }
}
