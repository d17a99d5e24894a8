//! # Application State Machine
//!
//! Named, coarse application modes (menu, playing, paused...).
//!
//! ## Transitions
//!
//! ```text
//!   request("b")          commit (Core stage)
//! ─────────────▶ pending ───────────────────▶ exit(a) → enter(b) → current = b
//! ```
//!
//! A request only records the target. Nothing changes until the scheduler
//! commits during [`Stage::Core`](crate::Stage::Core). Exit always runs before
//! enter, and `current` moves only after both hooks succeed.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::access::{AccessGuard, Operation};
use crate::error::{RegistryKind, RuntimeError, RuntimeResult};
use crate::world::World;

/// Callback bound to a state's enter or exit.
pub type StateHook = Rc<dyn Fn(&mut World) -> RuntimeResult<()>>;

/// Which hook of a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Runs when the state becomes current.
    Enter,
    /// Runs when the state stops being current.
    Exit,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        })
    }
}

#[derive(Default)]
struct StateEntry {
    enter: Option<StateHook>,
    exit: Option<StateHook>,
}

impl StateEntry {
    fn slot(&mut self, kind: HookKind) -> &mut Option<StateHook> {
        match kind {
            HookKind::Enter => &mut self.enter,
            HookKind::Exit => &mut self.exit,
        }
    }
}

/// A committed-but-not-yet-applied transition.
pub(crate) struct Transition {
    pub(crate) from: Option<String>,
    pub(crate) to: String,
    pub(crate) exit: Option<StateHook>,
    pub(crate) enter: Option<StateHook>,
}

/// Registry of named states with at most one current and one pending state.
pub struct StateMachine {
    guard: AccessGuard,
    states: HashMap<String, StateEntry>,
    current: Option<String>,
    pending: Option<String>,
}

impl StateMachine {
    /// Creates an empty state machine.
    #[must_use]
    pub fn new(guard: AccessGuard) -> Self {
        Self {
            guard,
            states: HashMap::new(),
            current: None,
            pending: None,
        }
    }

    /// Registers a state with no hooks bound.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside [`Stage::Configuring`](crate::Stage::Configuring)
    /// - `DuplicateName` if the name is taken
    pub fn register(&mut self, name: &str) -> RuntimeResult<()> {
        self.guard.enforce(Operation::RegisterState)?;
        if self.states.contains_key(name) {
            return Err(RuntimeError::duplicate(RegistryKind::State, name));
        }
        self.states.insert(name.to_owned(), StateEntry::default());
        Ok(())
    }

    /// Binds the enter hook of `name`.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside [`Stage::Configuring`](crate::Stage::Configuring)
    /// - `NotFound` if the state is unregistered
    /// - `DuplicateBinding` if an enter hook is already bound
    pub fn bind_enter<F>(&mut self, name: &str, hook: F) -> RuntimeResult<()>
    where
        F: Fn(&mut World) -> RuntimeResult<()> + 'static,
    {
        self.bind(name, HookKind::Enter, Rc::new(hook))
    }

    /// Binds the exit hook of `name`.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside [`Stage::Configuring`](crate::Stage::Configuring)
    /// - `NotFound` if the state is unregistered
    /// - `DuplicateBinding` if an exit hook is already bound
    pub fn bind_exit<F>(&mut self, name: &str, hook: F) -> RuntimeResult<()>
    where
        F: Fn(&mut World) -> RuntimeResult<()> + 'static,
    {
        self.bind(name, HookKind::Exit, Rc::new(hook))
    }

    fn bind(&mut self, name: &str, kind: HookKind, hook: StateHook) -> RuntimeResult<()> {
        self.guard.enforce(Operation::BindStateHook)?;
        let entry = self
            .states
            .get_mut(name)
            .ok_or_else(|| RuntimeError::not_found(RegistryKind::State, name))?;

        let slot = entry.slot(kind);
        if slot.is_some() {
            return Err(RuntimeError::DuplicateBinding {
                state: name.to_owned(),
                hook: kind,
            });
        }
        *slot = Some(hook);
        Ok(())
    }

    /// Requests a transition to `name`, applied at the next commit.
    ///
    /// A later request before the commit replaces the earlier one.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside Booting/Variable
    /// - `NotFound` if the state is unregistered
    /// - `AlreadyCurrent` if `name` is the current state
    pub fn request(&mut self, name: &str) -> RuntimeResult<()> {
        self.guard.enforce(Operation::RequestState)?;
        if !self.states.contains_key(name) {
            return Err(RuntimeError::not_found(RegistryKind::State, name));
        }
        if self.current.as_deref() == Some(name) {
            return Err(RuntimeError::AlreadyCurrent(name.to_owned()));
        }
        tracing::debug!("state transition requested: {}", name);
        self.pending = Some(name.to_owned());
        Ok(())
    }

    /// Returns whether `name` is the current state.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside FixedStep/Variable/Rendering
    /// - `NotFound` if the state is unregistered
    pub fn is_in(&self, name: &str) -> RuntimeResult<bool> {
        self.guard.enforce(Operation::QueryState)?;
        if !self.states.contains_key(name) {
            return Err(RuntimeError::not_found(RegistryKind::State, name));
        }
        Ok(self.current.as_deref() == Some(name))
    }

    /// The current state, if any.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The pending state, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Number of registered states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns true if no state is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Takes the pending transition, if any, with the hooks to run.
    ///
    /// State is not modified; see [`Self::finish_commit`].
    pub(crate) fn begin_commit(&self) -> RuntimeResult<Option<Transition>> {
        self.guard.enforce(Operation::CommitState)?;
        let Some(to) = self.pending.clone() else {
            return Ok(None);
        };

        let exit = self
            .current
            .as_ref()
            .and_then(|from| self.states.get(from))
            .and_then(|entry| entry.exit.clone());
        let enter = self.states.get(&to).and_then(|entry| entry.enter.clone());

        Ok(Some(Transition {
            from: self.current.clone(),
            to,
            exit,
            enter,
        }))
    }

    /// Makes the transition's target current and clears the pending slot.
    pub(crate) fn finish_commit(&mut self, transition: Transition) {
        tracing::info!(
            "state transition: {} -> {}",
            transition.from.as_deref().unwrap_or("<none>"),
            transition.to
        );
        self.current = Some(transition.to);
        self.pending = None;
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.states.keys().collect();
        names.sort();
        f.debug_struct("StateMachine")
            .field("states", &names)
            .field("current", &self.current)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
