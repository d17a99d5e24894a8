//! # Stage Access Guard
//!
//! Every phase-sensitive operation is listed in [`Operation`], and
//! [`Operation::allowed_stages`] is the one table that says when it is legal.
//! Components call [`AccessGuard::enforce`] before taking effect.
//!
//! The check is compiled in with the `stage-checks` feature (on by default).
//! Without it, [`enforce`] is a no-op that always succeeds.

use std::fmt;

use crate::error::{RuntimeError, RuntimeResult};
use crate::stage::{Stage, StageReader, StageSet};

/// A guarded runtime operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `EntityAllocator::spawn`.
    SpawnEntity,
    /// `StateMachine::register`.
    RegisterState,
    /// `StateMachine::bind_enter` / `bind_exit`.
    BindStateHook,
    /// `StateMachine::request`.
    RequestState,
    /// `World::apply_state_change`.
    CommitState,
    /// `StateMachine::is_in`.
    QueryState,
    /// `ResourceRegistry::add`.
    AddResource,
    /// `ResourceRegistry::try_get`.
    GetResource,
    /// `ResourceRegistry::try_get_mut`.
    GetResourceMut,
    /// `ResourceRegistry::remove`.
    RemoveResource,
    /// `SystemTable::register`.
    RegisterSystem,
    /// `SystemTable::run`.
    RunSystems,
}

impl Operation {
    /// Every guarded operation.
    pub const ALL: [Operation; 12] = [
        Self::SpawnEntity,
        Self::RegisterState,
        Self::BindStateHook,
        Self::RequestState,
        Self::CommitState,
        Self::QueryState,
        Self::AddResource,
        Self::GetResource,
        Self::GetResourceMut,
        Self::RemoveResource,
        Self::RegisterSystem,
        Self::RunSystems,
    ];

    /// The stages in which this operation may be invoked.
    #[must_use]
    pub const fn allowed_stages(self) -> StageSet {
        use Stage::{Booting, Configuring, Core, FixedStep, Rendering, Variable};

        match self {
            Self::SpawnEntity => StageSet::of(&[Booting, Core, FixedStep, Variable, Rendering]),
            Self::RegisterState | Self::BindStateHook | Self::RegisterSystem => {
                StageSet::only(Configuring)
            }
            Self::RequestState => StageSet::of(&[Booting, Variable]),
            Self::CommitState | Self::RunSystems => StageSet::only(Core),
            Self::QueryState | Self::GetResource => {
                StageSet::of(&[FixedStep, Variable, Rendering])
            }
            Self::AddResource => StageSet::of(&[Booting, FixedStep, Variable]),
            Self::GetResourceMut | Self::RemoveResource => StageSet::of(&[FixedStep, Variable]),
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SpawnEntity => "spawn",
            Self::RegisterState => "register_state",
            Self::BindStateHook => "bind_state_hook",
            Self::RequestState => "request_state",
            Self::CommitState => "commit_state",
            Self::QueryState => "is_in",
            Self::AddResource => "add_resource",
            Self::GetResource => "try_get_resource",
            Self::GetResourceMut => "try_get_resource_mut",
            Self::RemoveResource => "remove_resource",
            Self::RegisterSystem => "register_system",
            Self::RunSystems => "run_systems",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fails with [`RuntimeError::AccessViolation`] unless `current` is in `allowed`.
///
/// # Errors
///
/// Returns `AccessViolation` when the stage is outside the allowed set.
#[cfg(feature = "stage-checks")]
#[inline]
pub fn enforce(current: Stage, allowed: StageSet, operation: Operation) -> RuntimeResult<()> {
    if allowed.contains(current) {
        return Ok(());
    }
    tracing::error!(
        "access violation: {} called during {} (allowed: {})",
        operation,
        current,
        allowed
    );
    Err(RuntimeError::AccessViolation {
        operation,
        stage: current,
        allowed,
    })
}

/// Stage checks are compiled out; always succeeds.
///
/// # Errors
///
/// Never.
#[cfg(not(feature = "stage-checks"))]
#[inline(always)]
pub fn enforce(_current: Stage, _allowed: StageSet, _operation: Operation) -> RuntimeResult<()> {
    Ok(())
}

/// Checks operations against the current stage of one registry.
#[derive(Clone, Debug)]
pub struct AccessGuard {
    stages: StageReader,
}

impl AccessGuard {
    /// Creates a guard observing `stages`.
    #[must_use]
    pub fn new(stages: StageReader) -> Self {
        Self { stages }
    }

    /// Fails unless `operation` is legal in the current stage.
    ///
    /// # Errors
    ///
    /// Returns `AccessViolation` when called outside the operation's stages.
    #[inline]
    pub fn enforce(&self, operation: Operation) -> RuntimeResult<()> {
        enforce(self.stages.current(), operation.allowed_stages(), operation)
    }

    /// Returns the current stage.
    #[inline]
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stages.current()
    }

    /// Returns the underlying stage reader.
    #[must_use]
    pub fn stages(&self) -> &StageReader {
        &self.stages
    }
}
