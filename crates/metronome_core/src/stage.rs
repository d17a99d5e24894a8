//! # Execution Stages
//!
//! A frame is split into mutually exclusive stages. Exactly one stage is
//! current at any instant.
//!
//! ## Ownership
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │   Arc<AtomicU8>      │
//!                 └──────────┬───────────┘
//!              ┌─────────────┴──────────────┐
//!              ▼                            ▼
//!      ┌──────────────┐            ┌────────────────┐
//!      │ StageDriver  │            │  StageReader   │
//!      │ (scheduler)  │            │ (guards, many) │
//!      └──────────────┘            └────────────────┘
//! ```
//!
//! - `StageDriver`: the single writer. Not `Clone`, mutation takes `&mut self`.
//! - `StageReader`: any number of observers, on any thread.
//!
//! Writes use `Release`, reads use `Acquire`, so a guard check running on a
//! worker thread always sees a whole, consistent stage value.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// One part of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Before boot. States and systems are registered here.
    Configuring = 0,
    /// One-shot startup work after the window opens.
    Booting = 1,
    /// Internal bookkeeping between passes (state commits, system dispatch).
    Core = 2,
    /// Fixed-timestep simulation pass.
    FixedStep = 3,
    /// Once-per-frame variable-timestep pass.
    Variable = 4,
    /// Render pass.
    Rendering = 5,
    /// Teardown after the loop exits.
    Exiting = 6,
}

impl Stage {
    /// Every stage, in frame order.
    pub const ALL: [Stage; 7] = [
        Self::Configuring,
        Self::Booting,
        Self::Core,
        Self::FixedStep,
        Self::Variable,
        Self::Rendering,
        Self::Exiting,
    ];

    /// Converts from the raw atomic representation.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Configuring,
            1 => Self::Booting,
            2 => Self::Core,
            3 => Self::FixedStep,
            4 => Self::Variable,
            5 => Self::Rendering,
            _ => Self::Exiting,
        }
    }

    /// Human-readable stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Configuring => "Configuring",
            Self::Booting => "Booting",
            Self::Core => "Core",
            Self::FixedStep => "FixedStep",
            Self::Variable => "Variable",
            Self::Rendering => "Rendering",
            Self::Exiting => "Exiting",
        }
    }

    /// Returns true if systems may be registered against this stage.
    #[inline]
    #[must_use]
    pub const fn is_schedulable(self) -> bool {
        StageSet::SCHEDULABLE.contains(self)
    }

    #[inline]
    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of stages, stored as a bitmask (bit `n` = stage with discriminant `n`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageSet(u8);

impl StageSet {
    /// No stage at all.
    pub const EMPTY: Self = Self(0);

    /// Every stage.
    pub const ALL: Self = Self(0b0111_1111);

    /// Stages that accept registered systems.
    pub const SCHEDULABLE: Self = Self::EMPTY
        .with(Stage::Booting)
        .with(Stage::FixedStep)
        .with(Stage::Variable)
        .with(Stage::Rendering)
        .with(Stage::Exiting);

    /// A set holding exactly one stage.
    #[inline]
    #[must_use]
    pub const fn only(stage: Stage) -> Self {
        Self(stage.bit())
    }

    /// Returns a copy of this set with `stage` added.
    #[inline]
    #[must_use]
    pub const fn with(self, stage: Stage) -> Self {
        Self(self.0 | stage.bit())
    }

    /// Builds a set from a list of stages.
    #[must_use]
    pub const fn of(stages: &[Stage]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < stages.len() {
            bits |= stages[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// Union of two sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Checks membership.
    #[inline]
    #[must_use]
    pub const fn contains(self, stage: Stage) -> bool {
        (self.0 & stage.bit()) != 0
    }

    /// Returns true if no stage is in the set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bitmask.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Iterates the member stages in frame order.
    pub fn iter(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl fmt::Debug for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, stage) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(stage.name())?;
        }
        f.write_str("}")
    }
}

/// Creates a stage registry starting at [`Stage::Configuring`].
///
/// Returns the single writer and one reader. Further readers come from
/// [`StageDriver::reader`] or by cloning the reader.
#[must_use]
pub fn registry() -> (StageDriver, StageReader) {
    let cell = Arc::new(AtomicU8::new(Stage::Configuring as u8));
    let reader = StageReader {
        cell: Arc::clone(&cell),
    };
    (StageDriver { cell }, reader)
}

/// The single writer of the current stage. Owned by the scheduler.
#[derive(Debug)]
pub struct StageDriver {
    cell: Arc<AtomicU8>,
}

impl StageDriver {
    /// Makes `stage` current.
    #[inline]
    pub fn enter(&mut self, stage: Stage) {
        self.cell.store(stage as u8, Ordering::Release);
    }

    /// Returns the current stage.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Stage {
        Stage::from_u8(self.cell.load(Ordering::Acquire))
    }

    /// Creates a new observer of this registry.
    #[must_use]
    pub fn reader(&self) -> StageReader {
        StageReader {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Read-only view of the current stage. Cheap to clone, safe to send.
#[derive(Clone, Debug)]
pub struct StageReader {
    cell: Arc<AtomicU8>,
}

impl StageReader {
    /// Returns the current stage.
    #[inline]
    #[must_use]
    pub fn current(&self) -> Stage {
        Stage::from_u8(self.cell.load(Ordering::Acquire))
    }

    /// Returns true if the current stage is `stage`.
    #[inline]
    #[must_use]
    pub fn is(&self, stage: Stage) -> bool {
        self.current() == stage
    }
}
