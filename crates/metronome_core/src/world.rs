//! # World
//!
//! Everything a system or state hook can touch: the entity allocator, the
//! resource registry and the state machine. All three observe the same stage
//! registry.

use std::any::type_name;
use std::sync::Arc;

use crate::access::AccessGuard;
use crate::entity::{EntityAllocator, EntityId};
use crate::error::{RegistryKind, RuntimeError, RuntimeResult};
use crate::resource::ResourceRegistry;
use crate::stage::{Stage, StageReader};
use crate::state::{HookKind, StateMachine};
use crate::time::Time;

/// Shared runtime data passed to systems and hooks.
#[derive(Debug)]
pub struct World {
    stages: StageReader,
    entities: Arc<EntityAllocator>,
    resources: ResourceRegistry,
    states: StateMachine,
}

impl World {
    /// Creates an empty world observing `stages`.
    ///
    /// # Errors
    ///
    /// `EntropyUnavailable` if the entity allocator cannot be seeded.
    pub fn new(stages: StageReader) -> RuntimeResult<Self> {
        let entities = EntityAllocator::new(AccessGuard::new(stages.clone()))?;
        Ok(Self::with_entities(stages, entities))
    }

    /// Creates a world around an existing allocator (for example one built
    /// with [`EntityAllocator::resume`]).
    #[must_use]
    pub fn with_entities(stages: StageReader, entities: EntityAllocator) -> Self {
        Self {
            resources: ResourceRegistry::new(AccessGuard::new(stages.clone())),
            states: StateMachine::new(AccessGuard::new(stages.clone())),
            entities: Arc::new(entities),
            stages,
        }
    }

    /// The stage current right now.
    #[inline]
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stages.current()
    }

    /// Allocates a new entity id.
    ///
    /// # Errors
    ///
    /// `AccessViolation` during Configuring or Exiting.
    #[inline]
    pub fn spawn(&self) -> RuntimeResult<EntityId> {
        self.entities.spawn()
    }

    /// The entity allocator.
    #[must_use]
    pub fn entities(&self) -> &EntityAllocator {
        &self.entities
    }

    /// A shared handle to the allocator, for spawning from worker threads.
    #[must_use]
    pub fn entities_handle(&self) -> Arc<EntityAllocator> {
        Arc::clone(&self.entities)
    }

    /// The resource registry.
    #[must_use]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// The resource registry, mutably.
    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    /// The state machine.
    #[must_use]
    pub fn states(&self) -> &StateMachine {
        &self.states
    }

    /// The state machine, mutably.
    pub fn states_mut(&mut self) -> &mut StateMachine {
        &mut self.states
    }

    /// Frame timing, published by the scheduler after boot.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside FixedStep/Variable/Rendering
    /// - `NotFound` before boot
    pub fn time(&self) -> RuntimeResult<&Time> {
        self.resources
            .try_get::<Time>()?
            .ok_or_else(|| RuntimeError::not_found(RegistryKind::Resource, type_name::<Time>()))
    }

    /// Applies the pending state transition, if any.
    ///
    /// Runs the outgoing state's exit hook, then the incoming state's enter
    /// hook, then makes the new state current. A failing hook leaves both
    /// `current` and `pending` untouched. Returns whether a transition happened.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside [`Stage::Core`]
    /// - `StateHookFailed` wrapping the hook's error
    pub fn apply_state_change(&mut self) -> RuntimeResult<bool> {
        let Some(transition) = self.states.begin_commit()? else {
            return Ok(false);
        };

        if let (Some(from), Some(exit)) = (&transition.from, &transition.exit) {
            exit(self).map_err(|err| hook_failed(from, HookKind::Exit, err))?;
        }
        if let Some(enter) = &transition.enter {
            enter(self).map_err(|err| hook_failed(&transition.to, HookKind::Enter, err))?;
        }

        self.states.finish_commit(transition);
        Ok(true)
    }
}

fn hook_failed(state: &str, hook: HookKind, err: RuntimeError) -> RuntimeError {
    tracing::error!("{} hook of state '{}' failed: {}", hook, state, err);
    RuntimeError::StateHookFailed {
        state: state.to_owned(),
        hook,
        source: Box::new(err),
    }
}
