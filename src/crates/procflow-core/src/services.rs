//! External capabilities injected into the engine
//!
//! The kernel performs no I/O of its own. Everything that touches the outside
//! world (task lists, job queues, database locks, definition lookup and
//! persistence) is reached through the traits below, bundled into a shared
//! [`Services`] value.

use crate::config::EngineConfig;
use crate::definition::{GraphElementRef, ProcessDefinition};
use crate::delegation::Evaluator;
use crate::error::{ProcessError, Result};
use crate::event::EventType;
use crate::expression::SimpleEvaluator;
use crate::node::NodeId;
use crate::snapshot::InstanceSnapshot;
use crate::token::TokenId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Process instance identity
pub type InstanceId = Uuid;

/// Human task integration
pub trait TaskManager: Send + Sync {
    /// Create the tasks of a task node; returns how many were created
    fn create_tasks(
        &self,
        instance: InstanceId,
        token: TokenId,
        node: &str,
        tasks: &[String],
    ) -> Result<usize>;

    fn has_unfinished_tasks(&self, instance: InstanceId, token: TokenId, node: &str) -> Result<bool>;

    /// Cancel the open tasks of a task node
    fn end_tasks(&self, instance: InstanceId, token: TokenId, node: &str) -> Result<()>;
}

/// Fire-and-forget continuation handed to the host's job executor
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Resume with [`ProcessInstance::execute_node`](crate::instance::ProcessInstance::execute_node)
    ExecuteNode {
        instance: InstanceId,
        token: TokenId,
        node: NodeId,
    },
    /// Resume with [`ProcessInstance::execute_action`](crate::instance::ProcessInstance::execute_action)
    ExecuteAction {
        instance: InstanceId,
        token: TokenId,
        element: GraphElementRef,
        event: EventType,
        action_index: usize,
    },
    /// Resume with [`ProcessInstance::start_sub_process`](crate::instance::ProcessInstance::start_sub_process)
    StartSubProcess {
        instance: InstanceId,
        token: TokenId,
        sub_instance: InstanceId,
    },
}

pub trait MessageService: Send + Sync {
    fn send(&self, message: Message) -> Result<()>;
}

/// Host-side lock on a process instance, taken by joins before deciding
pub trait InstanceLock: Send + Sync {
    fn acquire(&self, instance: InstanceId, mode: &str) -> Result<()>;
}

/// Looks up definitions started by sub-process nodes
pub trait SubProcessResolver: Send + Sync {
    /// `version: None` resolves the latest version
    fn resolve(&self, name: &str, version: Option<u32>) -> Result<Option<Arc<ProcessDefinition>>>;
}

/// Persistence of instance snapshots
pub trait InstanceStore: Send + Sync {
    fn save(&self, snapshot: &InstanceSnapshot) -> Result<()>;

    fn load(&self, id: InstanceId) -> Result<Option<InstanceSnapshot>>;
}

/// Capabilities and policy shared by instances
#[derive(Clone)]
pub struct Services {
    pub config: EngineConfig,
    pub evaluator: Arc<dyn Evaluator>,
    pub task_manager: Option<Arc<dyn TaskManager>>,
    pub message_service: Option<Arc<dyn MessageService>>,
    pub instance_lock: Option<Arc<dyn InstanceLock>>,
    pub sub_process_resolver: Option<Arc<dyn SubProcessResolver>>,
    pub instance_store: Option<Arc<dyn InstanceStore>>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            evaluator: Arc::new(SimpleEvaluator),
            task_manager: None,
            message_service: None,
            instance_lock: None,
            sub_process_resolver: None,
            instance_store: None,
        }
    }
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_task_manager(mut self, task_manager: Arc<dyn TaskManager>) -> Self {
        self.task_manager = Some(task_manager);
        self
    }

    pub fn with_message_service(mut self, message_service: Arc<dyn MessageService>) -> Self {
        self.message_service = Some(message_service);
        self
    }

    pub fn with_instance_lock(mut self, instance_lock: Arc<dyn InstanceLock>) -> Self {
        self.instance_lock = Some(instance_lock);
        self
    }

    pub fn with_sub_process_resolver(mut self, resolver: Arc<dyn SubProcessResolver>) -> Self {
        self.sub_process_resolver = Some(resolver);
        self
    }

    pub fn with_instance_store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.instance_store = Some(store);
        self
    }

    pub(crate) fn send(&self, message: Message) -> Result<()> {
        let service = self.message_service.as_ref().ok_or_else(|| {
            ProcessError::configuration("asynchronous continuation requires a message service")
        })?;
        service.send(message)
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("task_manager", &self.task_manager.is_some())
            .field("message_service", &self.message_service.is_some())
            .field("instance_lock", &self.instance_lock.is_some())
            .field("sub_process_resolver", &self.sub_process_resolver.is_some())
            .field("instance_store", &self.instance_store.is_some())
            .finish()
    }
}

/// Versioned definitions by name; serves as a [`SubProcessResolver`]
///
/// Definitions are immutable once registered. Registering the same name and
/// version again replaces the earlier entry.
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<String, BTreeMap<u32, Arc<ProcessDefinition>>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, definition: Arc<ProcessDefinition>) {
        let name = definition.name().to_string();
        let version = definition.version();
        self.definitions
            .write()
            .entry(name.clone())
            .or_default()
            .insert(version, definition);
        tracing::info!(process = %name, version, "Process definition registered");
    }

    pub fn get(&self, name: &str, version: u32) -> Option<Arc<ProcessDefinition>> {
        self.definitions.read().get(name)?.get(&version).cloned()
    }

    pub fn latest(&self, name: &str) -> Option<Arc<ProcessDefinition>> {
        self.definitions
            .read()
            .get(name)?
            .values()
            .next_back()
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.definitions.read().values().map(|v| v.len()).sum()
    }
}

impl SubProcessResolver for DefinitionRegistry {
    fn resolve(&self, name: &str, version: Option<u32>) -> Result<Option<Arc<ProcessDefinition>>> {
        Ok(match version {
            Some(version) => self.get(name, version),
            None => self.latest(name),
        })
    }
}

/// [`InstanceStore`] kept in memory
#[derive(Default)]
pub struct InMemoryInstanceStore {
    snapshots: RwLock<HashMap<InstanceId, InstanceSnapshot>>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

impl InstanceStore for InMemoryInstanceStore {
    fn save(&self, snapshot: &InstanceSnapshot) -> Result<()> {
        self.snapshots.write().insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    fn load(&self, id: InstanceId) -> Result<Option<InstanceSnapshot>> {
        Ok(self.snapshots.read().get(&id).cloned())
    }
}
