//! # Frame Scheduler
//!
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. MEASURE     now() → FrameClock → delta (clamped)                 │
//! │ 2. ACCUMULATE  delta → FixedTimestep (clamped)                      │
//! │ 3. VARIABLE    run Variable systems once                            │
//! │ 4. FIXED       while a step is owed and cap not hit:                │
//! │                  run FixedStep systems, consume one step            │
//! │ 5. SPIRAL      cap hit with debt left → shed down to < 1 step       │
//! │ 6. ALPHA       accumulator / fixed_step                             │
//! │ 7. COMMIT      apply pending state transition (Core)                │
//! │ 8. RENDER      begin_frame, clear, Rendering systems, end_frame     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Between passes the stage is always [`Stage::Core`]. Any error aborts the
//! frame and is returned; [`Runtime::run`] then closes the window and stops.

use crate::access::{AccessGuard, Operation};
use crate::config::RuntimeConfig;
use crate::error::RuntimeResult;
use crate::resource::Lifetime;
use crate::stage::{self, Stage, StageDriver};
use crate::system::SystemTable;
use crate::time::{FixedTimestep, FrameClock, Time};
use crate::window::WindowBackend;
use crate::world::World;

/// What happened during one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Frame delta fed to the accumulator, in seconds.
    pub delta: f64,
    /// Fixed steps run this frame.
    pub fixed_steps: u32,
    /// Interpolation factor handed to the render pass.
    pub alpha: f64,
    /// Seconds dropped by the spiral guard (0 if it did not trigger).
    pub shed: f64,
}

/// Aggregate statistics over every frame run.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopStats {
    /// Frames recorded.
    pub frames: u64,
    /// Fixed steps run.
    pub fixed_steps: u64,
    /// Frames in which the spiral guard shed time.
    pub spiral_clamps: u64,
    /// Total seconds shed by the spiral guard.
    pub shed_seconds: f64,
    /// Sum of frame deltas.
    pub total_delta: f64,
    /// Smallest frame delta.
    pub min_delta: f64,
    /// Largest frame delta.
    pub max_delta: f64,
}

impl LoopStats {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: 0,
            fixed_steps: 0,
            spiral_clamps: 0,
            shed_seconds: 0.0,
            total_delta: 0.0,
            min_delta: f64::MAX,
            max_delta: 0.0,
        }
    }

    /// Records one frame.
    pub fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.fixed_steps += u64::from(report.fixed_steps);
        self.total_delta += report.delta;
        self.min_delta = self.min_delta.min(report.delta);
        self.max_delta = self.max_delta.max(report.delta);
        if report.shed > 0.0 {
            self.spiral_clamps += 1;
            self.shed_seconds += report.shed;
        }
    }

    /// Average frame delta in milliseconds.
    #[must_use]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.total_delta / self.frames as f64 * 1000.0
    }

    /// Average frames per second.
    #[must_use]
    pub fn avg_fps(&self) -> f64 {
        let avg_ms = self.avg_frame_ms();
        if avg_ms <= 0.0 {
            return 0.0;
        }
        1000.0 / avg_ms
    }

    /// Average fixed steps per frame.
    #[must_use]
    pub fn avg_fixed_steps(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.fixed_steps as f64 / self.frames as f64
    }
}

impl Default for LoopStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the world, the systems and the stage driver, and runs frames.
pub struct Runtime {
    config: RuntimeConfig,
    stages: StageDriver,
    guard: AccessGuard,
    systems: SystemTable,
    world: World,
    clock: FrameClock,
    timestep: FixedTimestep,
    stats: LoopStats,
    frame: u64,
}

impl Runtime {
    /// Builds a runtime in [`Stage::Configuring`].
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if `config` fails validation
    /// - `EntropyUnavailable` if the entity allocator cannot be seeded
    pub fn new(config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        let (stages, reader) = stage::registry();
        let world = World::new(reader.clone())?;
        let guard = AccessGuard::new(reader);
        let systems = SystemTable::new(guard.clone());
        let timing = &config.timing;

        Ok(Self {
            clock: FrameClock::new(timing.max_frame_delta),
            timestep: FixedTimestep::new(timing.fixed_step, timing.max_fixed_steps),
            config,
            stages,
            guard,
            systems,
            world,
            stats: LoopStats::new(),
            frame: 0,
        })
    }

    /// Registers a system. Only legal before [`boot`](Self::boot).
    ///
    /// # Errors
    ///
    /// See [`SystemTable::register`].
    pub fn add_system<F>(
        &mut self,
        stage: Stage,
        name: impl Into<String>,
        system: F,
    ) -> RuntimeResult<()>
    where
        F: FnMut(&mut World) -> RuntimeResult<()> + 'static,
    {
        self.systems.register(stage, name, system)
    }

    /// Opens the window, publishes [`Time`], runs Booting systems and commits
    /// the first state transition.
    ///
    /// # Errors
    ///
    /// Any error raised by a Booting system or state hook.
    pub fn boot<W: WindowBackend + ?Sized>(&mut self, window: &mut W) -> RuntimeResult<()> {
        let window_config = &self.config.window;
        window.open(window_config.width, window_config.height, &window_config.title);

        self.stages.enter(Stage::Booting);
        self.world
            .resources_mut()
            .add(Time::new(self.timestep.step()), Lifetime::Permanent)?;

        self.stages.enter(Stage::Core);
        let booted = self.systems.run(Stage::Booting, &mut self.stages, &mut self.world)?;
        self.world.apply_state_change()?;

        self.clock.reset();
        self.clock.sample(window.now());
        tracing::info!(
            "runtime booted: {} boot systems, fixed step {:.4}s, state {}",
            booted,
            self.timestep.step(),
            self.world.states().current().unwrap_or("<none>")
        );
        Ok(())
    }

    /// Runs one frame on wall-clock time from `window`.
    ///
    /// Both the frame delta and the accumulator are clamped to
    /// `max_frame_delta`. A frame rejected by the stage check leaves the
    /// clock and the accumulator untouched.
    ///
    /// # Errors
    ///
    /// - `AccessViolation` if called before boot or after shutdown
    /// - any error raised by a system or state hook
    pub fn frame<W: WindowBackend + ?Sized>(
        &mut self,
        window: &mut W,
    ) -> RuntimeResult<FrameReport> {
        self.guard.enforce(Operation::RunSystems)?;
        let delta = self.clock.sample(window.now());
        self.timestep.accumulate(delta);
        self.timestep.clamp_accumulator(self.config.timing.max_frame_delta);
        self.run_frame(delta, window)
    }

    /// Runs one frame with an externally supplied delta.
    ///
    /// Only the step cap and the spiral guard apply. Used for replays and
    /// deterministic tests.
    ///
    /// # Errors
    ///
    /// Same as [`frame`](Self::frame).
    pub fn advance<W: WindowBackend + ?Sized>(
        &mut self,
        frame_delta: f64,
        window: &mut W,
    ) -> RuntimeResult<FrameReport> {
        self.guard.enforce(Operation::RunSystems)?;
        let delta = frame_delta.max(0.0);
        self.timestep.accumulate(delta);
        self.run_frame(delta, window)
    }

    fn run_frame<W: WindowBackend + ?Sized>(
        &mut self,
        delta: f64,
        window: &mut W,
    ) -> RuntimeResult<FrameReport> {
        let frame = self.frame + 1;
        self.update_time(|time| {
            time.delta = delta;
            time.elapsed += delta;
            time.frame = frame;
        });

        self.systems.run(Stage::Variable, &mut self.stages, &mut self.world)?;

        let step = self.timestep.step();
        while self.timestep.try_consume() {
            self.update_time(|time| {
                time.fixed_tick += 1;
                time.fixed_elapsed += step;
            });
            self.systems.run(Stage::FixedStep, &mut self.stages, &mut self.world)?;
        }
        let fixed_steps = self.timestep.steps_this_frame();

        let shed = self.timestep.finish_frame();
        if shed > 0.0 {
            tracing::warn!(
                "frame {}: step cap of {} reached, shed {:.4}s of simulation time",
                frame,
                self.timestep.max_steps(),
                shed
            );
        }

        let alpha = self.timestep.alpha();
        self.update_time(|time| time.alpha = alpha);

        self.world.apply_state_change()?;

        window.begin_frame();
        window.clear(self.config.window.clear_color);
        self.systems.run(Stage::Rendering, &mut self.stages, &mut self.world)?;
        window.end_frame();
        self.frame = frame;

        let report = FrameReport {
            frame,
            delta,
            fixed_steps,
            alpha,
            shed,
        };
        self.stats.record(&report);
        tracing::debug!(
            "frame {}: delta {:.4}s, {} fixed steps, alpha {:.3}",
            frame,
            delta,
            fixed_steps,
            alpha
        );
        Ok(report)
    }

    fn update_time(&mut self, edit: impl FnOnce(&mut Time)) {
        if let Some(time) = self.world.resources_mut().get_mut_unchecked::<Time>() {
            edit(time);
        }
    }

    /// Runs Exiting systems, leaves the stage at [`Stage::Exiting`] and
    /// closes the window.
    ///
    /// # Errors
    ///
    /// Any error raised by an Exiting system. The window is closed either way.
    pub fn shutdown<W: WindowBackend + ?Sized>(&mut self, window: &mut W) -> RuntimeResult<()> {
        let result = self.systems.run(Stage::Exiting, &mut self.stages, &mut self.world);
        self.stages.enter(Stage::Exiting);
        window.close();
        tracing::info!(
            "runtime shut down after {} frames ({} fixed steps)",
            self.stats.frames,
            self.stats.fixed_steps
        );
        result.map(|_| ())
    }

    /// Boots, runs frames until the window asks to close, then shuts down.
    ///
    /// # Errors
    ///
    /// The first error raised anywhere in the loop. The window is closed
    /// before returning.
    pub fn run<W: WindowBackend + ?Sized>(&mut self, window: &mut W) -> RuntimeResult<LoopStats> {
        if let Err(err) = self.boot(window) {
            window.close();
            return Err(err);
        }

        while !window.should_close() {
            if let Err(err) = self.frame(window) {
                tracing::error!("frame {} aborted: {}", self.frame + 1, err);
                self.stages.enter(Stage::Exiting);
                window.close();
                return Err(err);
            }
        }

        self.shutdown(window)?;
        Ok(self.stats.clone())
    }

    /// The configuration this runtime was built with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stages.current()
    }

    /// The shared world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The shared world, mutably (for registering states before boot).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The system table.
    #[must_use]
    pub fn systems(&self) -> &SystemTable {
        &self.systems
    }

    /// The fixed-step accumulator.
    #[must_use]
    pub fn timestep(&self) -> &FixedTimestep {
        &self.timestep
    }

    /// Statistics so far.
    #[must_use]
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Frames completed.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("stage", &self.stages.current())
            .field("frame", &self.frame)
            .field("systems", &self.systems)
            .field("timestep", &self.timestep)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::window::HeadlessWindow;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn test_runtime_creation() {
        let runtime = runtime();
        assert_eq!(runtime.stage(), Stage::Configuring);
        assert_eq!(runtime.frame_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RuntimeConfig::default();
        config.timing.max_fixed_steps = 0;
        assert!(matches!(Runtime::new(config), Err(RuntimeError::InvalidConfig(_))));
    }

    #[test]
    fn test_boot_publishes_time() {
        let mut runtime = runtime();
        let mut window = HeadlessWindow::scripted(1, 1.0 / 60.0);
        runtime.boot(&mut window).unwrap();

        assert_eq!(runtime.stage(), Stage::Core);
        assert!(window.is_open());
        assert_eq!(window.size(), (1280, 720));
        assert_eq!(
            runtime.world().resources().lifetime_of::<Time>(),
            Some(Lifetime::Permanent)
        );
    }

    #[cfg(feature = "stage-checks")]
    #[test]
    fn test_frame_before_boot_fails() {
        let mut runtime = runtime();
        let mut window = HeadlessWindow::scripted(1, 0.01);
        assert!(matches!(
            runtime.frame(&mut window),
            Err(RuntimeError::AccessViolation { .. })
        ));
    }

    #[cfg(feature = "stage-checks")]
    #[test]
    fn test_rejected_frame_leaves_timing_untouched() {
        let mut runtime = runtime();
        let mut window = HeadlessWindow::scripted(4, 0.0);
        assert!(runtime.advance(1.0, &mut window).is_err());
        assert!(runtime.frame(&mut window).is_err());
        assert_eq!(runtime.timestep().accumulator(), 0.0);
        assert_eq!(runtime.stats().frames, 0);

        runtime.boot(&mut window).unwrap();
        let report = runtime.advance(0.0, &mut window).unwrap();
        assert_eq!(report.fixed_steps, 0);
        assert_eq!(report.shed, 0.0);
    }

    #[test]
    fn test_advance_counts_steps() {
        let mut runtime = runtime();
        let mut window = HeadlessWindow::scripted(100, 0.0);
        runtime.boot(&mut window).unwrap();

        let report = runtime.advance(0.06, &mut window).unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(report.fixed_steps, 3);
        assert_eq!(report.shed, 0.0);
        assert!(report.alpha < 1.0);
        assert_eq!(window.calls().frames_presented, 1);
        assert_eq!(window.last_clear(), Some(runtime.config().window.clear_color));
    }

    #[test]
    fn test_frame_clamps_large_delta() {
        let mut runtime = runtime();
        let mut window = HeadlessWindow::scripted(100, 5.0);
        runtime.boot(&mut window).unwrap();

        runtime.frame(&mut window).unwrap();
        let report = runtime.frame(&mut window).unwrap();
        assert_eq!(report.delta, 0.25);
        assert!(report.fixed_steps <= 8);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut stats = LoopStats::new();
        stats.record(&FrameReport {
            frame: 1,
            delta: 0.02,
            fixed_steps: 1,
            alpha: 0.2,
            shed: 0.0,
        });
        stats.record(&FrameReport {
            frame: 2,
            delta: 0.04,
            fixed_steps: 2,
            alpha: 0.4,
            shed: 0.1,
        });

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.fixed_steps, 3);
        assert_eq!(stats.spiral_clamps, 1);
        assert!((stats.avg_frame_ms() - 30.0).abs() < 1e-9);
        assert!((stats.avg_fixed_steps() - 1.5).abs() < 1e-9);
        assert_eq!(stats.min_delta, 0.02);
        assert_eq!(stats.max_delta, 0.04);
    }
}
