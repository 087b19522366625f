//! Error types for process construction and execution
//!
//! Every fallible operation in this crate returns [`Result`], an alias over
//! [`ProcessError`]. The variants fall into four groups:
//!
//! ```text
//! ProcessError
//! ├── Configuration      - malformed graph, detected at build time (or a missing default at signal time)
//! ├── IllegalState       - signaling an ended/locked/suspended token, unknown transitions, ...
//! ├── Raised             - a user exception in flight, matchable by exception handlers
//! ├── Delegation         - a user exception no handler caught
//! ├── Evaluation         - expression or script produced an unusable result
//! ├── StepLimitExceeded  - runaway pass-through loop
//! ├── Fatal              - never intercepted by exception handlers
//! └── Serialization / Yaml / Toml / Io
//! ```
//!
//! # Raising from user code
//!
//! Action and decision handlers report failures by returning
//! [`ProcessError::raised`]. The engine routes such errors through the
//! exception-handler chain of the element that ran the handler; only if no
//! handler matches does the `signal` caller see a [`ProcessError::Delegation`].
//!
//! ```rust
//! use procflow_core::error::ProcessError;
//!
//! let err = ProcessError::raised("PaymentDeclined", "card expired");
//! assert_eq!(err.exception_kind().as_deref(), Some("PaymentDeclined"));
//! assert!(!err.is_fatal());
//!
//! let fatal = ProcessError::fatal("out of memory");
//! assert!(fatal.is_fatal());
//! ```

use thiserror::Error;

/// Convenience result type using [`ProcessError`]
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Error type for all process-kernel operations
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The process graph is malformed
    ///
    /// Raised by [`ProcessDefinitionBuilder::build`](crate::builder::ProcessDefinitionBuilder::build)
    /// for unresolved destinations, duplicate names and missing default
    /// transitions, and at signal time when a node has no default transition.
    /// Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operation is not allowed in the current runtime state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A user exception raised by delegated behavior
    ///
    /// `kind` is the name exception handlers filter on.
    #[error("Exception '{kind}' raised: {message}")]
    Raised {
        /// Exception kind used for handler matching
        kind: String,
        /// Human readable description
        message: String,
    },

    /// A user exception that no exception handler caught
    #[error("Delegation failed in {element}: [{kind}] {message}")]
    Delegation {
        /// Graph element whose behavior raised the exception
        element: String,
        /// Exception kind
        kind: String,
        /// Exception message
        message: String,
    },

    /// An expression or script produced a result of the wrong shape
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// A single control-flow pass took more steps than allowed
    #[error("Token '{token}' exceeded the limit of {limit} steps in one pass")]
    StepLimitExceeded {
        /// Full name of the token being driven
        token: String,
        /// Configured limit
        limit: usize,
    },

    /// Non-recoverable failure; bypasses every exception handler
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an illegal-state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// Create a user exception of the given kind
    ///
    /// This is what action, decision and script handlers return to trigger
    /// the exception-handler chain.
    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an evaluation error
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }

    /// Create a fatal error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Whether this error must bypass exception handlers
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::StepLimitExceeded { .. })
    }

    /// The kind exception handlers match this error against
    ///
    /// Returns `None` for errors that are never handed to exception handlers:
    /// fatal errors, step-limit violations and delegation failures that already
    /// went through a handler chain.
    pub fn exception_kind(&self) -> Option<String> {
        let kind = match self {
            Self::Raised { kind, .. } => kind.as_str(),
            Self::Configuration(_) => "Configuration",
            Self::IllegalState(_) => "IllegalState",
            Self::Evaluation(_) => "Evaluation",
            Self::Serialization(_) => "Serialization",
            Self::Yaml(_) | Self::Toml(_) => "Parse",
            Self::Io(_) => "Io",
            Self::Delegation { .. } | Self::Fatal(_) | Self::StepLimitExceeded { .. } => {
                return None
            }
        };
        Some(kind.to_string())
    }

    /// The message carried by user exceptions, or the display text otherwise
    pub fn exception_message(&self) -> String {
        match self {
            Self::Raised { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
