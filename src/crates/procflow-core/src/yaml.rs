//! YAML-based process definitions
//!
//! Nodes are listed in declaration order; the order matters for the first
//! node of a process without a start state and for the first child a
//! superstate delegates to. User behavior is referenced by name and looked up
//! in a [`HandlerRegistry`].
//!
//! ```yaml
//! name: approval
//! version: 2
//! nodes:
//!   - name: start
//!     type: start
//!     transitions:
//!       - to: review
//!   - name: review
//!     type: state
//!     transitions:
//!       - name: approve
//!         to: done
//!   - name: done
//!     type: end
//! ```

use crate::builder::{NodeSpec, TransitionSpec};
use crate::definition::ProcessDefinition;
use crate::delegation::{FirstSelector, RandomSelector, Script, TransitionSelector};
use crate::error::{ProcessError, Result};
use crate::event::{Action, EventType};
use crate::exception::ExceptionHandler;
use crate::node::{
    DecisionCondition, DecisionConfig, EndConfig, ForkConfig, InterleaveConfig, JoinConfig,
    MergeConfig, NodeKind, PlainConfig, SubProcessConfig, TaskConfig, VariableMapping,
    DEFAULT_INTERLEAVE_VARIABLE,
};
use crate::registry::HandlerRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Top-level YAML process definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlProcessDef {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Nodes at process scope, in declaration order
    pub nodes: Vec<YamlNodeDef>,

    /// Process-scoped actions by event name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub events: BTreeMap<String, Vec<YamlActionDef>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception_handlers: Vec<YamlExceptionHandlerDef>,
}

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YamlNodeType {
    Start,
    End,
    State,
    Node,
    Decision,
    Fork,
    Join,
    Merge,
    InterleaveStart,
    InterleaveEnd,
    Task,
    SubProcess,
    SuperState,
}

/// Node definition in YAML
///
/// Kind-specific keys are ignored by node types that do not use them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlNodeDef {
    pub name: String,

    #[serde(rename = "type")]
    pub node_type: YamlNodeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Execute through an `ExecuteNode` message
    #[serde(default, rename = "async", skip_serializing_if = "is_false")]
    pub is_async: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<YamlTransitionDef>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub events: BTreeMap<String, Vec<YamlActionDef>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception_handlers: Vec<YamlExceptionHandlerDef>,

    /// Children of a superstate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<YamlNodeDef>,

    /// Action of a plain node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<YamlActionDef>,

    /// Registered decision handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,

    /// Decision expression naming the transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<YamlConditionDef>,

    /// Registered fork or join script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub discriminator: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_names: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_out_of_m: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_mode: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub synchronized: bool,

    /// Interleave variable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,

    /// Interleave selector: `first` or `random`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub blocking: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub end_tasks: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_process: Option<YamlSubProcessDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<YamlMappingDef>,

    /// End the whole instance when reached
    #[serde(default, skip_serializing_if = "is_false")]
    pub ends_process: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlTransitionDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Destination path relative to the declaring node's scope
    pub to: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<YamlActionDef>,
}

/// Action reference: a registered name, or a name with options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlActionDef {
    Name(String),
    Detailed {
        handler: String,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,

        /// Run for events propagated from nested elements
        #[serde(default = "default_true")]
        propagation: bool,

        #[serde(default, rename = "async")]
        is_async: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlExceptionHandlerDef {
    /// Exception kind to match; absent matches everything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub actions: Vec<YamlActionDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlConditionDef {
    pub expression: String,
    pub transition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlSubProcessDef {
    pub name: String,

    /// Absent resolves the latest version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default, rename = "async", skip_serializing_if = "is_false")]
    pub is_async: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlMappingDef {
    pub variable: String,

    /// Name inside the sub-process; defaults to `variable`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_name: Option<String>,

    #[serde(default = "default_true")]
    pub read: bool,

    #[serde(default = "default_true")]
    pub write: bool,
}

impl YamlProcessDef {
    /// Load a process definition from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a process definition from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Resolve handler names and build the definition
    pub fn to_definition(&self, registry: &HandlerRegistry) -> Result<ProcessDefinition> {
        let mut builder = ProcessDefinition::builder(self.name.clone());
        builder.version(self.version);
        if let Some(description) = &self.description {
            builder.description(description.clone());
        }
        for node in &self.nodes {
            builder.add_node(node.to_spec(registry)?);
        }
        for (event, actions) in &self.events {
            let event_type = EventType::from_name(event);
            for action in actions {
                builder.on(event_type.clone(), action.resolve(registry)?);
            }
        }
        for handler in &self.exception_handlers {
            builder.exception_handler(handler.resolve(registry)?);
        }
        builder.build()
    }
}

impl YamlNodeDef {
    fn to_spec(&self, registry: &HandlerRegistry) -> Result<NodeSpec> {
        let mut spec = NodeSpec::new(self.name.clone(), self.kind(registry)?);
        if let Some(description) = &self.description {
            spec = spec.description(description.clone());
        }
        if self.is_async {
            spec = spec.asynchronous();
        }
        for transition in &self.transitions {
            spec = spec.transition(transition.to_spec(registry)?);
        }
        for (event, actions) in &self.events {
            let event_type = EventType::from_name(event);
            for action in actions {
                spec = spec.on(event_type.clone(), action.resolve(registry)?);
            }
        }
        for handler in &self.exception_handlers {
            spec = spec.exception_handler(handler.resolve(registry)?);
        }
        for child in &self.nodes {
            spec = spec.child(child.to_spec(registry)?);
        }
        Ok(spec)
    }

    fn kind(&self, registry: &HandlerRegistry) -> Result<NodeKind> {
        let kind = match self.node_type {
            YamlNodeType::Start => NodeKind::Start,
            YamlNodeType::End => NodeKind::End(EndConfig {
                ends_process: self.ends_process,
            }),
            YamlNodeType::State => NodeKind::State,
            YamlNodeType::Node => NodeKind::Plain(PlainConfig {
                action: self
                    .action
                    .as_ref()
                    .map(|action| action.resolve(registry))
                    .transpose()?,
            }),
            YamlNodeType::Decision => NodeKind::Decision(DecisionConfig {
                handler: self
                    .handler
                    .as_deref()
                    .map(|name| registry.decision(name))
                    .transpose()?,
                expression: self.expression.clone(),
                conditions: self
                    .conditions
                    .iter()
                    .map(|c| DecisionCondition {
                        expression: c.expression.clone(),
                        transition: c.transition.clone(),
                    })
                    .collect(),
            }),
            YamlNodeType::Fork => NodeKind::Fork(ForkConfig {
                script: self.script(registry)?,
            }),
            YamlNodeType::Join => NodeKind::Join(JoinConfig {
                discriminator: self.discriminator,
                token_names: self.token_names.clone(),
                script: self.script(registry)?,
                n_out_of_m: self.n_out_of_m,
                parent_lock_mode: self.lock_mode.clone(),
            }),
            YamlNodeType::Merge => NodeKind::Merge(MergeConfig {
                synchronized: self.synchronized,
            }),
            YamlNodeType::InterleaveStart => NodeKind::InterleaveStart(InterleaveConfig {
                variable: self
                    .variable
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INTERLEAVE_VARIABLE.to_string()),
                selector: self.selector()?,
            }),
            YamlNodeType::InterleaveEnd => NodeKind::InterleaveEnd,
            YamlNodeType::Task => NodeKind::Task(TaskConfig {
                tasks: self.tasks.clone(),
                blocking: self.blocking,
                end_tasks: self.end_tasks,
            }),
            YamlNodeType::SubProcess => {
                let sub_process = self.sub_process.as_ref().ok_or_else(|| {
                    ProcessError::configuration(format!(
                        "sub-process node '{}' needs a 'sub_process' section",
                        self.name
                    ))
                })?;
                NodeKind::SubProcess(SubProcessConfig {
                    name: sub_process.name.clone(),
                    version: sub_process.version,
                    mappings: self
                        .mappings
                        .iter()
                        .map(|m| VariableMapping {
                            variable: m.variable.clone(),
                            mapped_name: m.mapped_name.clone().unwrap_or_else(|| m.variable.clone()),
                            read: m.read,
                            write: m.write,
                        })
                        .collect(),
                    is_async: sub_process.is_async,
                })
            }
            YamlNodeType::SuperState => NodeKind::SuperState,
        };
        Ok(kind)
    }

    fn script(&self, registry: &HandlerRegistry) -> Result<Option<Arc<dyn Script>>> {
        self.script
            .as_deref()
            .map(|name| registry.script(name))
            .transpose()
    }

    fn selector(&self) -> Result<Arc<dyn TransitionSelector>> {
        match self.selector.as_deref() {
            None | Some("first") => Ok(Arc::new(FirstSelector)),
            Some("random") => Ok(Arc::new(RandomSelector)),
            Some(other) => Err(ProcessError::configuration(format!(
                "unknown interleave selector '{}' on node '{}'",
                other, self.name
            ))),
        }
    }
}

impl YamlTransitionDef {
    fn to_spec(&self, registry: &HandlerRegistry) -> Result<TransitionSpec> {
        let mut spec = TransitionSpec::to(self.to.clone());
        if let Some(name) = &self.name {
            spec = spec.named(name.clone());
        }
        if let Some(condition) = &self.condition {
            spec = spec.condition(condition.clone());
        }
        if let Some(description) = &self.description {
            spec = spec.description(description.clone());
        }
        for action in &self.actions {
            spec = spec.action(action.resolve(registry)?);
        }
        Ok(spec)
    }
}

impl YamlActionDef {
    fn resolve(&self, registry: &HandlerRegistry) -> Result<Action> {
        match self {
            Self::Name(handler) => registry.action(handler),
            Self::Detailed {
                handler,
                name,
                propagation,
                is_async,
            } => {
                let mut action = registry.action(handler)?;
                if let Some(name) = name {
                    action = action.named(name.clone());
                }
                if !propagation {
                    action = action.without_propagation();
                }
                if *is_async {
                    action = action.asynchronous();
                }
                Ok(action)
            }
        }
    }
}

impl YamlExceptionHandlerDef {
    fn resolve(&self, registry: &HandlerRegistry) -> Result<ExceptionHandler> {
        let mut handler = match &self.kind {
            Some(kind) => ExceptionHandler::for_kind(kind.clone()),
            None => ExceptionHandler::any(),
        };
        for action in &self.actions {
            handler = handler.action(action.resolve(registry)?);
        }
        Ok(handler)
    }
}

impl ProcessDefinition {
    /// Parse and build a definition from YAML text
    pub fn from_yaml(yaml: &str, registry: &HandlerRegistry) -> Result<Self> {
        YamlProcessDef::from_str(yaml)?.to_definition(registry)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>, registry: &HandlerRegistry) -> Result<Self> {
        YamlProcessDef::from_file(path)?.to_definition(registry)
    }
}
