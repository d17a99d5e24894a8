//! # Metronome Core
//!
//! Frame-phase runtime for real-time applications:
//! - Phase-gated access to entities, resources and application states
//! - Fixed-step simulation with a spiral-of-death guard
//! - Variable-step update and interpolated render passes
//!
//! ## Architecture Rules
//!
//! 1. **One writer for the phase** - only the scheduler moves between stages
//! 2. **Every guarded call is checked** - against one static operation table
//! 3. **Deferred transitions** - state changes commit between passes, never mid-pass
//!
//! ## Example
//!
//! ```rust,ignore
//! use metronome_core::{HeadlessWindow, Runtime, RuntimeConfig, Stage};
//!
//! let mut runtime = Runtime::new(RuntimeConfig::default())?;
//! runtime.add_system(Stage::FixedStep, "physics", |world| {
//!     let _dt = world.time()?.fixed_delta;
//!     Ok(())
//! })?;
//! runtime.run(&mut HeadlessWindow::new(Some(600)))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod access;
pub mod config;
pub mod entity;
pub mod error;
pub mod resource;
pub mod scheduler;
pub mod stage;
pub mod state;
pub mod system;
pub mod time;
pub mod window;
pub mod world;

pub use access::{AccessGuard, Operation};
pub use config::{RuntimeConfig, TimingConfig, WindowConfig};
pub use entity::{AllocatorState, EntityAllocator, EntityId};
pub use error::{RegistryKind, RuntimeError, RuntimeResult};
pub use resource::{Lifetime, ResourceRegistry};
pub use scheduler::{FrameReport, LoopStats, Runtime};
pub use stage::{Stage, StageDriver, StageReader, StageSet};
pub use state::{HookKind, StateHook, StateMachine};
pub use system::{SystemFn, SystemTable};
pub use time::{FixedTimestep, FrameClock, Time};
pub use window::{Color, HeadlessClock, HeadlessWindow, WindowBackend, WindowCalls};
pub use world::World;
