//! Shared helpers for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use procflow_core::{
    Action, ExecutionContext, GraphElementRef, InstanceId, Message, MessageService, Result,
};
use std::sync::Arc;

/// Records labels from actions in execution order
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Action appending `label`
    pub fn action(&self, label: &str) -> Action {
        let entries = Arc::clone(&self.entries);
        let label = label.to_string();
        Action::from_fn(move |_| {
            entries.lock().push(label.clone());
            Ok(())
        })
    }

    /// Action appending `label@<event source name>`
    pub fn source_action(&self, label: &str) -> Action {
        let entries = Arc::clone(&self.entries);
        let label = label.to_string();
        Action::from_fn(move |ctx| {
            let source = element_name(ctx, ctx.event_source());
            entries.lock().push(format!("{}@{}", label, source));
            Ok(())
        })
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == label).count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

pub fn element_name(ctx: &ExecutionContext<'_>, element: Option<GraphElementRef>) -> String {
    match element {
        Some(GraphElementRef::Node(id)) => ctx.definition().node(id).name().to_string(),
        Some(GraphElementRef::Transition(id)) => ctx
            .definition()
            .transition(id)
            .name()
            .unwrap_or("transition")
            .to_string(),
        Some(GraphElementRef::Process) => "process".to_string(),
        None => "none".to_string(),
    }
}

/// Message service keeping every message it was handed
#[derive(Default)]
pub struct RecordingMessages {
    messages: Mutex<Vec<Message>>,
}

impl RecordingMessages {
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl MessageService for RecordingMessages {
    fn send(&self, message: Message) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

pub fn instance_of(message: &Message) -> InstanceId {
    match message {
        Message::ExecuteNode { instance, .. }
        | Message::ExecuteAction { instance, .. }
        | Message::StartSubProcess { instance, .. } => *instance,
    }
}
