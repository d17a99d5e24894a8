//! # System Table
//!
//! Named callbacks grouped by the stage they run in. Within a stage, systems
//! run once each, in registration order.
//!
//! ```text
//!  Booting   ─▶ [ load_assets, spawn_player ]
//!  FixedStep ─▶ [ physics, collisions ]
//!  Variable  ─▶ [ input, camera ]
//!  Rendering ─▶ [ draw_world, draw_ui ]
//!  Exiting   ─▶ [ save ]
//! ```

use std::fmt;

use crate::access::{AccessGuard, Operation};
use crate::error::{RegistryKind, RuntimeError, RuntimeResult};
use crate::stage::{Stage, StageDriver};
use crate::world::World;

/// Boxed system callback.
pub type SystemFn = Box<dyn FnMut(&mut World) -> RuntimeResult<()>>;

struct SystemEntry {
    name: String,
    run: SystemFn,
}

/// Per-stage ordered lists of systems.
pub struct SystemTable {
    guard: AccessGuard,
    passes: [Vec<SystemEntry>; Stage::ALL.len()],
}

impl SystemTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(guard: AccessGuard) -> Self {
        Self {
            guard,
            passes: Default::default(),
        }
    }

    /// Appends a system to `stage` under `name`.
    ///
    /// Names are unique per stage; the same name may appear in two stages.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` outside [`Stage::Configuring`]
    /// - `PhaseNotSchedulable` for Configuring or Core
    /// - `DuplicateName` if `name` is already used in `stage`
    pub fn register<F>(
        &mut self,
        stage: Stage,
        name: impl Into<String>,
        system: F,
    ) -> RuntimeResult<()>
    where
        F: FnMut(&mut World) -> RuntimeResult<()> + 'static,
    {
        self.guard.enforce(Operation::RegisterSystem)?;
        if !stage.is_schedulable() {
            return Err(RuntimeError::PhaseNotSchedulable(stage));
        }

        let name = name.into();
        let pass = &mut self.passes[stage as usize];
        if pass.iter().any(|entry| entry.name == name) {
            return Err(RuntimeError::duplicate(RegistryKind::System, name));
        }

        tracing::debug!("system registered: {} in {}", name, stage);
        pass.push(SystemEntry {
            name,
            run: Box::new(system),
        });
        Ok(())
    }

    /// Runs every system of `stage` in order, then returns to [`Stage::Core`].
    ///
    /// Stops at the first failing system. Returns how many systems ran.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` unless called from [`Stage::Core`]
    /// - `SystemFailed` wrapping the first system error
    pub fn run(
        &mut self,
        stage: Stage,
        driver: &mut StageDriver,
        world: &mut World,
    ) -> RuntimeResult<usize> {
        self.guard.enforce(Operation::RunSystems)?;
        let pass = &mut self.passes[stage as usize];
        if pass.is_empty() {
            return Ok(0);
        }

        driver.enter(stage);
        let mut result = Ok(pass.len());
        for entry in pass.iter_mut() {
            if let Err(err) = (entry.run)(world) {
                tracing::error!("system '{}' failed during {}: {}", entry.name, stage, err);
                result = Err(RuntimeError::SystemFailed {
                    system: entry.name.clone(),
                    stage,
                    source: Box::new(err),
                });
                break;
            }
        }
        driver.enter(Stage::Core);
        result
    }

    /// Number of systems registered in `stage`.
    #[must_use]
    pub fn len(&self, stage: Stage) -> usize {
        self.passes[stage as usize].len()
    }

    /// Returns true if no system is registered in any stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.iter().all(Vec::is_empty)
    }

    /// Names of the systems in `stage`, in run order.
    pub fn names(&self, stage: Stage) -> impl Iterator<Item = &str> {
        self.passes[stage as usize].iter().map(|entry| entry.name.as_str())
    }
}

impl fmt::Debug for SystemTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for stage in Stage::ALL {
            if self.len(stage) > 0 {
                map.entry(&stage, &self.names(stage).collect::<Vec<_>>());
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Lifetime;
    use crate::stage;

    #[derive(Default)]
    struct Trace(Vec<&'static str>);

    fn setup() -> (StageDriver, SystemTable, World) {
        let (driver, reader) = stage::registry();
        let table = SystemTable::new(AccessGuard::new(reader.clone()));
        let world = World::new(reader).unwrap();
        (driver, table, world)
    }

    fn push(world: &mut World, tag: &'static str) -> RuntimeResult<()> {
        if let Some(trace) = world.resources_mut().try_get_mut::<Trace>()? {
            trace.0.push(tag);
        }
        Ok(())
    }

    #[test]
    fn test_register_rejects_core() {
        let (_driver, mut table, _world) = setup();
        let err = table.register(Stage::Core, "bad", |_| Ok(())).unwrap_err();
        assert_eq!(err, RuntimeError::PhaseNotSchedulable(Stage::Core));

        let err = table.register(Stage::Configuring, "bad", |_| Ok(())).unwrap_err();
        assert_eq!(err, RuntimeError::PhaseNotSchedulable(Stage::Configuring));
    }

    #[test]
    fn test_register_duplicate_in_same_stage() {
        let (_driver, mut table, _world) = setup();
        table.register(Stage::Variable, "input", |_| Ok(())).unwrap();
        table.register(Stage::Rendering, "input", |_| Ok(())).unwrap();

        let err = table.register(Stage::Variable, "input", |_| Ok(())).unwrap_err();
        assert_eq!(err, RuntimeError::duplicate(RegistryKind::System, "input"));
        assert_eq!(table.len(Stage::Variable), 1);
    }

    #[cfg(feature = "stage-checks")]
    #[test]
    fn test_register_after_configuring_fails() {
        let (mut driver, mut table, _world) = setup();
        driver.enter(Stage::Core);
        assert!(matches!(
            table.register(Stage::Variable, "late", |_| Ok(())),
            Err(RuntimeError::AccessViolation { .. })
        ));
    }

    #[test]
    fn test_run_in_registration_order() {
        let (mut driver, mut table, mut world) = setup();
        table.register(Stage::Variable, "first", |w| push(w, "first")).unwrap();
        table.register(Stage::Variable, "second", |w| push(w, "second")).unwrap();
        table.register(Stage::Variable, "third", |w| push(w, "third")).unwrap();
        assert_eq!(
            table.names(Stage::Variable).collect::<Vec<_>>(),
            ["first", "second", "third"]
        );

        driver.enter(Stage::Booting);
        world.resources_mut().add(Trace::default(), Lifetime::Transient).unwrap();
        driver.enter(Stage::Core);

        assert_eq!(table.run(Stage::Variable, &mut driver, &mut world).unwrap(), 3);
        assert_eq!(driver.current(), Stage::Core);

        driver.enter(Stage::Variable);
        let trace = world.resources().try_get::<Trace>().unwrap().unwrap();
        assert_eq!(trace.0, ["first", "second", "third"]);
    }

    #[test]
    fn test_run_sees_its_own_stage() {
        let (mut driver, mut table, mut world) = setup();
        table
            .register(Stage::Rendering, "probe", |w| {
                assert_eq!(w.stage(), Stage::Rendering);
                Ok(())
            })
            .unwrap();

        driver.enter(Stage::Core);
        table.run(Stage::Rendering, &mut driver, &mut world).unwrap();
    }

    #[test]
    fn test_failure_stops_pass_and_restores_core() {
        let (mut driver, mut table, mut world) = setup();
        table.register(Stage::FixedStep, "ok", |w| push(w, "ok")).unwrap();
        table
            .register(Stage::FixedStep, "boom", |_| {
                Err(RuntimeError::CallbackFailed("boom".into()))
            })
            .unwrap();
        table.register(Stage::FixedStep, "never", |w| push(w, "never")).unwrap();

        driver.enter(Stage::Booting);
        world.resources_mut().add(Trace::default(), Lifetime::Transient).unwrap();
        driver.enter(Stage::Core);

        let err = table.run(Stage::FixedStep, &mut driver, &mut world).unwrap_err();
        assert!(matches!(
            &err,
            RuntimeError::SystemFailed { system, stage: Stage::FixedStep, .. } if system == "boom"
        ));
        assert_eq!(driver.current(), Stage::Core);

        driver.enter(Stage::Variable);
        let trace = world.resources().try_get::<Trace>().unwrap().unwrap();
        assert_eq!(trace.0, ["ok"]);
    }

    #[cfg(feature = "stage-checks")]
    #[test]
    fn test_run_outside_core_fails() {
        let (mut driver, mut table, mut world) = setup();
        driver.enter(Stage::Variable);
        assert!(matches!(
            table.run(Stage::Rendering, &mut driver, &mut world),
            Err(RuntimeError::AccessViolation { .. })
        ));
    }
}
