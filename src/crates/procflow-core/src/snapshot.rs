//! Serializable instance state
//!
//! A snapshot captures everything a [`ProcessInstance`] owns: the token tree
//! with node positions as full node paths, per-token variables, locks and
//! running sub-processes. Definitions and services are not part of it; they
//! are supplied again on restore.

use crate::definition::ProcessDefinition;
use crate::error::{ProcessError, Result};
use crate::instance::{ProcessInstance, SuperProcessRef};
use crate::services::{InstanceId, Services};
use crate::token::{Token, TokenId, TokenTree};
use crate::variables::{InMemoryVariableStore, VariableStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub id: InstanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub process_name: String,
    pub process_version: u32,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_process: Option<SuperProcessRef>,
    /// Token arena; the root comes first
    pub tokens: Vec<TokenSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub id: TokenId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TokenId>,
    #[serde(default)]
    pub children: Vec<TokenId>,
    /// Full path of the current node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_enter: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,
    #[serde(default)]
    pub suspended: bool,
    pub able_to_reactivate_parent: bool,
    #[serde(default)]
    pub forks: u32,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_process: Option<Box<InstanceSnapshot>>,
}

impl InstanceSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl ProcessInstance {
    pub fn snapshot(&self) -> InstanceSnapshot {
        let tokens = self
            .tokens
            .iter()
            .map(|token| TokenSnapshot {
                id: token.id,
                name: token.name.clone(),
                parent: token.parent,
                children: token.children.clone(),
                node: token.node.map(|node| self.definition.full_name(node)),
                start: token.start,
                end: token.end,
                node_enter: token.node_enter,
                lock: token.lock.clone(),
                suspended: token.suspended,
                able_to_reactivate_parent: token.able_to_reactivate_parent,
                forks: token.forks,
                round: token.round,
                variables: self.variables.all(token.id).into_iter().collect(),
                sub_process: token
                    .sub_process
                    .as_deref()
                    .map(|sub| Box::new(sub.snapshot())),
            })
            .collect();

        InstanceSnapshot {
            id: self.id,
            key: self.key.clone(),
            process_name: self.definition.name().to_string(),
            process_version: self.definition.version(),
            start: self.start,
            end: self.end,
            suspended: self.suspended,
            super_process: self.super_process,
            tokens,
        }
    }

    /// Rebuild an instance from a snapshot of `definition`
    ///
    /// Sub-process definitions are looked up through the services' resolver.
    pub fn restore(
        snapshot: &InstanceSnapshot,
        definition: Arc<ProcessDefinition>,
        services: Arc<Services>,
    ) -> Result<Self> {
        if snapshot.process_name != definition.name()
            || snapshot.process_version != definition.version()
        {
            return Err(ProcessError::configuration(format!(
                "snapshot of '{}' v{} cannot be restored with '{}' v{}",
                snapshot.process_name,
                snapshot.process_version,
                definition.name(),
                definition.version()
            )));
        }

        let mut variables = InMemoryVariableStore::new();
        let mut tokens = Vec::with_capacity(snapshot.tokens.len());
        for saved in &snapshot.tokens {
            let node = saved
                .node
                .as_deref()
                .map(|path| {
                    definition.find_node_id(path).ok_or_else(|| {
                        ProcessError::configuration(format!(
                            "snapshot refers to unknown node '{}' in '{}'",
                            path,
                            definition.name()
                        ))
                    })
                })
                .transpose()?;
            let sub_process = saved
                .sub_process
                .as_deref()
                .map(|sub| restore_sub_process(sub, &services))
                .transpose()?;

            let mut token = Token::new(saved.id, saved.name.clone(), saved.parent);
            token.children = saved.children.clone();
            token.node = node;
            token.start = saved.start;
            token.end = saved.end;
            token.node_enter = saved.node_enter;
            token.lock = saved.lock.clone();
            token.suspended = saved.suspended;
            token.able_to_reactivate_parent = saved.able_to_reactivate_parent;
            token.forks = saved.forks;
            token.round = saved.round;
            token.sub_process = sub_process.map(Box::new);
            tokens.push(token);

            for (name, value) in &saved.variables {
                variables.set(saved.id, name, value.clone());
            }
        }

        let mut instance = ProcessInstance::create(definition, services, Box::new(variables));
        instance.tokens = TokenTree::from_tokens(tokens)?;
        instance.id = snapshot.id;
        instance.key = snapshot.key.clone();
        instance.start = snapshot.start;
        instance.end = snapshot.end;
        instance.suspended = snapshot.suspended;
        instance.super_process = snapshot.super_process;
        tracing::debug!(
            instance = %instance.id,
            process = %snapshot.process_name,
            tokens = snapshot.tokens.len(),
            "Process instance restored"
        );
        Ok(instance)
    }

    /// Save a snapshot through the configured instance store
    pub fn save(&self) -> Result<()> {
        let store = self.services.instance_store.as_ref().ok_or_else(|| {
            ProcessError::configuration("saving an instance requires an instance store")
        })?;
        store.save(&self.snapshot())
    }

    /// Load and restore an instance from the services' instance store
    pub fn load(
        id: InstanceId,
        definition: Arc<ProcessDefinition>,
        services: Arc<Services>,
    ) -> Result<Option<Self>> {
        let store = services.instance_store.clone().ok_or_else(|| {
            ProcessError::configuration("loading an instance requires an instance store")
        })?;
        store
            .load(id)?
            .map(|snapshot| Self::restore(&snapshot, definition, services))
            .transpose()
    }
}

fn restore_sub_process(
    snapshot: &InstanceSnapshot,
    services: &Arc<Services>,
) -> Result<ProcessInstance> {
    let resolver = services.sub_process_resolver.as_ref().ok_or_else(|| {
        ProcessError::configuration("restoring a sub-process requires a sub-process resolver")
    })?;
    let definition = resolver
        .resolve(&snapshot.process_name, Some(snapshot.process_version))?
        .ok_or_else(|| {
            ProcessError::configuration(format!(
                "sub-process definition '{}' v{} not found",
                snapshot.process_name, snapshot.process_version
            ))
        })?;
    ProcessInstance::restore(snapshot, definition, Arc::clone(services))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeSpec;
    use crate::services::InMemoryInstanceStore;
    use serde_json::json;

    fn definition() -> Arc<ProcessDefinition> {
        let mut builder = ProcessDefinition::builder("snap");
        builder
            .add_node(NodeSpec::start("start").to("split"))
            .add_node(NodeSpec::fork("split").to("left").to("right"))
            .add_node(NodeSpec::state("left").to("join"))
            .add_node(NodeSpec::state("right").to("join"))
            .add_node(NodeSpec::join("join").to("end"))
            .add_node(NodeSpec::end("end"));
        Arc::new(builder.build().unwrap())
    }

    #[test]
    fn test_snapshot_json_restore() {
        let definition = definition();
        let mut instance = ProcessInstance::builder(Arc::clone(&definition))
            .variable("amount", json!(5))
            .start()
            .unwrap();
        instance.signal().unwrap();
        assert_eq!(instance.tokens().len(), 3);

        let json = instance.snapshot().to_json().unwrap();
        let snapshot = InstanceSnapshot::from_json(&json).unwrap();
        assert_eq!(snapshot.tokens[1].node.as_deref(), Some("left"));

        let mut restored =
            ProcessInstance::restore(&snapshot, definition, Arc::new(Services::new())).unwrap();
        assert_eq!(restored.id(), instance.id());
        assert_eq!(restored.variable("amount"), Some(json!(5)));
        assert!(restored.token(restored.root_token()).unwrap().is_locked());

        let left = restored.find_token("/1").unwrap();
        let right = restored.find_token("/2").unwrap();
        restored.signal_token(left, None).unwrap();
        restored.signal_token(right, None).unwrap();
        assert!(restored.has_ended());
    }

    #[test]
    fn test_restore_rejects_other_version() {
        let instance = ProcessInstance::new(definition()).unwrap();
        let mut snapshot = instance.snapshot();
        snapshot.process_version = 7;
        let err =
            ProcessInstance::restore(&snapshot, definition(), Arc::new(Services::new())).unwrap_err();
        assert!(matches!(err, ProcessError::Configuration(_)));
    }

    #[test]
    fn test_save_and_load() {
        let store = Arc::new(InMemoryInstanceStore::new());
        let services = Arc::new(Services::new().with_instance_store(store.clone()));
        let instance = ProcessInstance::with_services(definition(), Arc::clone(&services)).unwrap();
        instance.save().unwrap();
        assert_eq!(store.len(), 1);

        let loaded = ProcessInstance::load(instance.id(), definition(), services)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.node_name(loaded.root_token()).as_deref(), Some("start"));
        assert!(ProcessInstance::new(definition()).unwrap().save().is_err());
    }
}
