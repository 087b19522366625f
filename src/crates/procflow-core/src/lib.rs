//! # procflow-core - Token-Based Process Execution Kernel
//!
//! An embeddable, synchronous process engine. A [`ProcessDefinition`] is an
//! immutable graph of nodes and transitions, optionally nested in
//! superstates. A [`ProcessInstance`] runs it with a tree of tokens: each
//! token sits on one node, forks create child tokens, joins end them and
//! reactivate their parent.
//!
//! ## Core Concepts
//!
//! - **Nodes**: a closed set of kinds ([`NodeKind`]): start, end, state,
//!   plain, decision, fork, join, merge, interleave start/end, task,
//!   sub-process and superstate.
//! - **Signals**: [`ProcessInstance::signal_token`] moves a waiting token over
//!   a named or default transition. The call returns once every token it
//!   moved is waiting again or has ended.
//! - **Events**: actions registered on nodes, transitions, superstates and
//!   the definition run on lifecycle events (`node-enter`,
//!   `superstate-enter`, `transition`, ...) and propagate outward.
//! - **Exception handlers**: failures raised by user code are offered to the
//!   raising element's handlers, then each enclosing scope's.
//! - **Services**: task lists, job messages, instance locks, sub-process
//!   lookup and persistence are injected as traits ([`Services`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use procflow_core::{EventType, Action, NodeSpec, ProcessDefinition, ProcessInstance};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut builder = ProcessDefinition::builder("order");
//! builder
//!     .add_node(NodeSpec::start("start").to("split"))
//!     .add_node(NodeSpec::fork("split").transition_named("pay", "payment").transition_named("ship", "shipping"))
//!     .add_node(NodeSpec::state("payment").to("join"))
//!     .add_node(NodeSpec::state("shipping").to("join"))
//!     .add_node(NodeSpec::join("join").to("done"))
//!     .add_node(
//!         NodeSpec::end("done").on(
//!             EventType::NodeEnter,
//!             Action::from_fn(|ctx| {
//!                 ctx.set_variable("completed", json!(true));
//!                 Ok(())
//!             }),
//!         ),
//!     );
//! let definition = Arc::new(builder.build().unwrap());
//!
//! let mut instance = ProcessInstance::new(definition).unwrap();
//! instance.signal().unwrap();
//! instance.signal_path("/pay", None).unwrap();
//! instance.signal_path("/ship", None).unwrap();
//!
//! assert!(instance.has_ended());
//! assert_eq!(instance.variable("completed"), Some(json!(true)));
//! ```
//!
//! ## Declarative Definitions
//!
//! Definitions can be loaded from YAML with handlers resolved by name through
//! a [`HandlerRegistry`]; see [`yaml`].
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events with structured fields and never
//! installs a subscriber.

pub mod builder;
pub mod config;
pub mod context;
pub mod definition;
pub mod delegation;
mod engine;
pub mod error;
pub mod event;
pub mod exception;
pub mod expression;
pub mod instance;
pub mod node;
mod nodes;
pub mod registry;
pub mod services;
pub mod snapshot;
pub mod token;
pub mod transition;
pub mod variables;
pub mod yaml;

pub use builder::{NodeSpec, ProcessDefinitionBuilder, TransitionSpec};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use definition::{GraphElementRef, ProcessDefinition};
pub use delegation::{
    decision_fn, script_fn, DecisionHandler, EvalValue, Evaluator, ExpectedType, FirstSelector,
    RandomSelector, Script, TransitionSelector,
};
pub use error::{ProcessError, Result};
pub use event::{Action, ActionHandler, EventType};
pub use exception::{Exception, ExceptionHandler};
pub use expression::SimpleEvaluator;
pub use instance::{InstanceBuilder, ProcessInstance, SuperProcessRef};
pub use node::{
    DecisionCondition, DecisionConfig, EndConfig, ForkConfig, InterleaveConfig, JoinConfig,
    MergeConfig, Node, NodeId, NodeKind, PlainConfig, SubProcessConfig, TaskConfig,
    VariableMapping,
};
pub use registry::HandlerRegistry;
pub use services::{
    DefinitionRegistry, InMemoryInstanceStore, InstanceId, InstanceLock, InstanceStore, Message,
    MessageService, Services, SubProcessResolver, TaskManager,
};
pub use snapshot::{InstanceSnapshot, TokenSnapshot};
pub use token::{Token, TokenId};
pub use transition::{Transition, TransitionId};
pub use variables::{InMemoryVariableStore, VariableStore};
pub use yaml::YamlProcessDef;
