//! # Resource Registry
//!
//! Singleton values keyed by type. At most one value per type.
//!
//! Permanent resources live until the registry is dropped; transient ones may
//! be removed from the simulation passes.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::access::{AccessGuard, Operation};
use crate::error::{RegistryKind, RuntimeError, RuntimeResult};

/// How long a resource is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Cannot be removed.
    Permanent,
    /// May be removed during FixedStep or Variable.
    Transient,
}

struct ResourceEntry {
    value: Box<dyn Any>,
    lifetime: Lifetime,
    type_name: &'static str,
}

/// Type-keyed store of singleton resources.
pub struct ResourceRegistry {
    guard: AccessGuard,
    entries: HashMap<TypeId, ResourceEntry>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(guard: AccessGuard) -> Self {
        Self {
            guard,
            entries: HashMap::new(),
        }
    }

    /// Registers `value` as the resource of type `T`.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside Booting/FixedStep/Variable
    /// - `AlreadyExists` if a `T` is already registered
    pub fn add<T: 'static>(&mut self, value: T, lifetime: Lifetime) -> RuntimeResult<()> {
        self.guard.enforce(Operation::AddResource)?;
        self.insert(value, lifetime)
    }

    /// Inserts without consulting the stage.
    pub(crate) fn insert<T: 'static>(
        &mut self,
        value: T,
        lifetime: Lifetime,
    ) -> RuntimeResult<()> {
        let key = TypeId::of::<T>();
        if self.entries.contains_key(&key) {
            return Err(RuntimeError::AlreadyExists(type_name::<T>()));
        }
        tracing::debug!("resource added: {} ({:?})", type_name::<T>(), lifetime);
        self.entries.insert(
            key,
            ResourceEntry {
                value: Box::new(value),
                lifetime,
                type_name: type_name::<T>(),
            },
        );
        Ok(())
    }

    /// Returns the resource of type `T`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// `AccessViolation` outside FixedStep/Variable/Rendering.
    pub fn try_get<T: 'static>(&self) -> RuntimeResult<Option<&T>> {
        self.guard.enforce(Operation::GetResource)?;
        Ok(self
            .entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_ref::<T>()))
    }

    /// Returns the resource of type `T` mutably, or `None` if absent.
    ///
    /// # Errors
    ///
    /// `AccessViolation` outside FixedStep/Variable.
    pub fn try_get_mut<T: 'static>(&mut self) -> RuntimeResult<Option<&mut T>> {
        self.guard.enforce(Operation::GetResourceMut)?;
        Ok(self.get_mut_unchecked::<T>())
    }

    /// Mutable access for the scheduler's own bookkeeping.
    pub(crate) fn get_mut_unchecked<T: 'static>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_mut::<T>())
    }

    /// Removes the transient resource of type `T` and returns it.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside FixedStep/Variable
    /// - `NotFound` if no `T` is registered
    /// - `PermanentResource` if `T` was added as [`Lifetime::Permanent`]
    pub fn remove<T: 'static>(&mut self) -> RuntimeResult<T> {
        self.guard.enforce(Operation::RemoveResource)?;
        let key = TypeId::of::<T>();
        match self.entries.get(&key).map(|entry| entry.lifetime) {
            None => {
                return Err(RuntimeError::not_found(
                    RegistryKind::Resource,
                    type_name::<T>(),
                ))
            }
            Some(Lifetime::Permanent) => {
                return Err(RuntimeError::PermanentResource(type_name::<T>()))
            }
            Some(Lifetime::Transient) => {}
        }

        let entry = self
            .entries
            .remove(&key)
            .ok_or_else(|| RuntimeError::not_found(RegistryKind::Resource, type_name::<T>()))?;
        tracing::debug!("resource removed: {}", entry.type_name);
        entry
            .value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| RuntimeError::not_found(RegistryKind::Resource, type_name::<T>()))
    }

    /// Returns true if a `T` is registered.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Lifetime the `T` resource was registered with.
    #[must_use]
    pub fn lifetime_of<T: 'static>(&self) -> Option<Lifetime> {
        self.entries.get(&TypeId::of::<T>()).map(|entry| entry.lifetime)
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no resource is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        f.debug_struct("ResourceRegistry")
            .field("resources", &names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{self, Stage, StageDriver};

    #[derive(Debug, PartialEq)]
    struct Score(u32);

    #[derive(Debug, PartialEq)]
    struct Gravity(f32);

    fn registry_in(stage: Stage) -> (StageDriver, ResourceRegistry) {
        let (mut driver, reader) = stage::registry();
        driver.enter(stage);
        (driver, ResourceRegistry::new(AccessGuard::new(reader)))
    }

    #[test]
    fn test_add_then_get() {
        let (mut driver, mut resources) = registry_in(Stage::Booting);
        resources.add(Score(3), Lifetime::Transient).unwrap();

        driver.enter(Stage::Rendering);
        assert_eq!(resources.try_get::<Score>().unwrap(), Some(&Score(3)));
        assert_eq!(resources.try_get::<Gravity>().unwrap(), None);
    }

    #[test]
    fn test_add_twice_fails() {
        let (_driver, mut resources) = registry_in(Stage::Variable);
        resources.add(Score(1), Lifetime::Transient).unwrap();

        let err = resources.add(Score(2), Lifetime::Transient).unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyExists(name) if name.ends_with("Score")));
        assert_eq!(resources.len(), 1);
    }

    #[cfg(feature = "stage-checks")]
    #[test]
    fn test_add_during_render_fails() {
        let (_driver, mut resources) = registry_in(Stage::Rendering);
        assert!(matches!(
            resources.add(Score(1), Lifetime::Transient),
            Err(RuntimeError::AccessViolation { .. })
        ));
        assert!(resources.is_empty());
    }

    #[cfg(feature = "stage-checks")]
    #[test]
    fn test_get_during_boot_fails() {
        let (_driver, mut resources) = registry_in(Stage::Booting);
        resources.add(Score(1), Lifetime::Transient).unwrap();
        assert!(matches!(
            resources.try_get::<Score>(),
            Err(RuntimeError::AccessViolation { .. })
        ));
    }

    #[test]
    fn test_remove_transient() {
        let (_driver, mut resources) = registry_in(Stage::FixedStep);
        resources.add(Score(9), Lifetime::Transient).unwrap();

        assert_eq!(resources.remove::<Score>().unwrap(), Score(9));
        assert!(!resources.contains::<Score>());
    }

    #[test]
    fn test_remove_permanent_fails() {
        let (_driver, mut resources) = registry_in(Stage::Variable);
        resources.add(Gravity(9.8), Lifetime::Permanent).unwrap();

        let err = resources.remove::<Gravity>().unwrap_err();
        assert!(matches!(err, RuntimeError::PermanentResource(_)));
        assert_eq!(resources.lifetime_of::<Gravity>(), Some(Lifetime::Permanent));
    }

    #[test]
    fn test_remove_missing_fails() {
        let (_driver, mut resources) = registry_in(Stage::Variable);
        assert!(matches!(
            resources.remove::<Score>(),
            Err(RuntimeError::NotFound {
                kind: RegistryKind::Resource,
                ..
            })
        ));
    }

    #[test]
    fn test_get_mut_edits_in_place() {
        let (_driver, mut resources) = registry_in(Stage::Variable);
        resources.add(Score(1), Lifetime::Transient).unwrap();

        if let Some(score) = resources.try_get_mut::<Score>().unwrap() {
            score.0 += 41;
        }
        assert_eq!(resources.try_get::<Score>().unwrap(), Some(&Score(42)));
    }

    #[cfg(feature = "stage-checks")]
    #[test]
    fn test_get_mut_during_render_names_the_mutable_get() {
        let (_driver, mut resources) = registry_in(Stage::Rendering);
        let err = resources.try_get_mut::<Score>().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::AccessViolation {
                operation: Operation::GetResourceMut,
                stage: Stage::Rendering,
                ..
            }
        ));
        assert!(err.to_string().contains("try_get_resource_mut"));
    }
}
