//! # Runtime Error Types
//!
//! Every condition the runtime reports. All of them are programmer errors
//! raised synchronously at the call site that broke the contract; none are
//! retried and none are swallowed.

use thiserror::Error;

use crate::access::Operation;
use crate::stage::{Stage, StageSet};
use crate::state::HookKind;

/// Which registry a name or type was looked up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistryKind {
    /// Named application state.
    State,
    /// Type-keyed resource.
    Resource,
    /// Named system within one phase.
    System,
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::State => "state",
            Self::Resource => "resource",
            Self::System => "system",
        })
    }
}

/// Errors that can occur in the runtime core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// An operation was invoked outside its legal phase set.
    #[error("{operation} is not allowed during {stage} (allowed: {allowed})")]
    AccessViolation {
        /// The guarded operation.
        operation: Operation,
        /// Phase current at the time of the call.
        stage: Stage,
        /// Phases in which the operation is legal.
        allowed: StageSet,
    },

    /// A state or system name was registered twice.
    #[error("{kind} '{name}' is already registered")]
    DuplicateName {
        /// Registry the name belongs to.
        kind: RegistryKind,
        /// The duplicated name.
        name: String,
    },

    /// A hook of the same kind is already bound to the state.
    #[error("state '{state}' already has an {hook} hook")]
    DuplicateBinding {
        /// State the hook was bound to.
        state: String,
        /// Enter or exit.
        hook: HookKind,
    },

    /// Reference to an unregistered state, resource or system.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Registry that was searched.
        kind: RegistryKind,
        /// The missing name (type name for resources).
        name: String,
    },

    /// A transition was requested to the state that is already current.
    #[error("state '{0}' is already current")]
    AlreadyCurrent(String),

    /// A resource of this type is already registered.
    #[error("resource '{0}' already exists")]
    AlreadyExists(&'static str),

    /// Attempted to remove a resource registered as permanent.
    #[error("resource '{0}' is permanent and cannot be removed")]
    PermanentResource(&'static str),

    /// A system was registered against a phase that does not run systems.
    #[error("systems cannot be scheduled in {0}")]
    PhaseNotSchedulable(Stage),

    /// Textual entity id failed to parse.
    #[error("malformed entity id '{input}': {reason}")]
    MalformedIdentifier {
        /// The rejected text.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The operating system random source failed.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised by user callbacks to abort the frame.
    #[error("callback failed: {0}")]
    CallbackFailed(String),

    /// A system returned an error while running.
    #[error("system '{system}' failed during {stage}")]
    SystemFailed {
        /// Name the system was registered under.
        system: String,
        /// Phase the system was running in.
        stage: Stage,
        /// The error the system returned.
        #[source]
        source: Box<RuntimeError>,
    },

    /// A state enter or exit hook returned an error.
    #[error("{hook} hook of state '{state}' failed")]
    StateHookFailed {
        /// State whose hook failed.
        state: String,
        /// Enter or exit.
        hook: HookKind,
        /// The error the hook returned.
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Shorthand for [`RuntimeError::NotFound`].
    pub(crate) fn not_found(kind: RegistryKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for [`RuntimeError::DuplicateName`].
    pub(crate) fn duplicate(kind: RegistryKind, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
