//! Exception handlers and the in-flight exception record

use crate::error::ProcessError;
use crate::event::Action;
use serde::{Deserialize, Serialize};

/// A user failure travelling through the exception-handler chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    pub kind: String,
    pub message: String,
}

impl Exception {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Exception record for a handleable error, `None` for fatal ones
    pub fn from_error(error: &ProcessError) -> Option<Self> {
        error.exception_kind().map(|kind| Self {
            kind,
            message: error.exception_message(),
        })
    }
}

/// Ordered actions run when a matching exception reaches the owning element
///
/// A handler without a kind filter matches every exception, so it belongs at
/// the end of an element's handler list.
#[derive(Debug, Clone, Default)]
pub struct ExceptionHandler {
    pub(crate) exception_kind: Option<String>,
    pub(crate) actions: Vec<Action>,
}

impl ExceptionHandler {
    /// Handler matching any exception
    pub fn any() -> Self {
        Self::default()
    }

    /// Handler matching a single exception kind
    pub fn for_kind(kind: impl Into<String>) -> Self {
        Self {
            exception_kind: Some(kind.into()),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn matches(&self, kind: &str) -> bool {
        self.exception_kind.as_deref().map_or(true, |k| k == kind)
    }

    pub fn exception_kind(&self) -> Option<&str> {
        self.exception_kind.as_deref()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}
