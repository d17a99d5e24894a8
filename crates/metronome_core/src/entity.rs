//! # Entity Identifiers
//!
//! Entities are 64-bit identifiers packed big-to-small:
//!
//! ```text
//!  63            48 47            32 31                             0
//! ┌────────────────┬────────────────┬────────────────────────────────┐
//! │ session (u16)  │  token (u16)   │          index (u32)           │
//! └────────────────┴────────────────┴────────────────────────────────┘
//! ```
//!
//! - `index`: monotonically increasing within a session, unique per spawn
//! - `token`: random per spawn, for diagnostic distinctiveness only
//! - `session`: random, redrawn each time the index counter wraps
//!
//! Textual form is `SSSS-TTTT-IIIIIIII` in uppercase hex (18 characters).

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::access::{AccessGuard, Operation};
use crate::error::{RuntimeError, RuntimeResult};

/// Length of the textual form.
pub const TEXT_LEN: usize = 18;

/// Byte positions of the two separators in the textual form.
const SEPARATORS: [usize; 2] = [4, 9];

/// Unique identifier for an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Packs an identifier from its three fields.
    #[inline]
    #[must_use]
    pub const fn from_parts(session: u16, token: u16, index: u32) -> Self {
        Self(((session as u64) << 48) | ((token as u64) << 32) | (index as u64))
    }

    /// Wraps a raw 64-bit value.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw 64-bit value.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Returns the session portion.
    #[inline]
    #[must_use]
    pub const fn session(self) -> u16 {
        (self.0 >> 48) as u16
    }

    /// Returns the random token portion.
    #[inline]
    #[must_use]
    pub const fn token(self) -> u16 {
        (self.0 >> 32) as u16
    }

    /// Returns the index portion.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}-{:04X}-{:08X}",
            self.session(),
            self.token(),
            self.index()
        )
    }
}

impl FromStr for EntityId {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| RuntimeError::MalformedIdentifier {
            input: s.to_owned(),
            reason,
        };

        let bytes = s.as_bytes();
        if bytes.len() != TEXT_LEN {
            return Err(malformed("expected 18 characters"));
        }
        if SEPARATORS.iter().any(|&i| bytes[i] != b'-') {
            return Err(malformed("expected '-' at positions 4 and 9"));
        }

        // from_str_radix alone would accept a leading '+'
        let group = |range: std::ops::Range<usize>| {
            let text = &s[range];
            if text.bytes().all(|b| b.is_ascii_hexdigit()) {
                Ok(text)
            } else {
                Err(malformed("groups must be hexadecimal"))
            }
        };

        let session = u16::from_str_radix(group(0..4)?, 16)
            .map_err(|_| malformed("invalid session group"))?;
        let token = u16::from_str_radix(group(5..9)?, 16)
            .map_err(|_| malformed("invalid token group"))?;
        let index = u32::from_str_radix(group(10..18)?, 16)
            .map_err(|_| malformed("invalid index group"))?;

        Ok(Self::from_parts(session, token, index))
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Saved allocator position, for resuming a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorState {
    /// Current session id.
    pub session: u16,
    /// Last issued index.
    pub counter: u32,
}

/// Issues unique entity identifiers. Safe to share across threads.
///
/// # Thread Safety
///
/// Session and counter share one atomic word:
///
/// ```text
///  63            48 47            32 31                             0
/// ┌────────────────┬────────────────┬────────────────────────────────┐
/// │    (unused)    │ session (u16)  │         counter (u32)          │
/// └────────────────┴────────────────┴────────────────────────────────┘
/// ```
///
/// `spawn` advances both with one compare-exchange. The caller whose
/// increment wraps the counter to zero draws the new session before its
/// exchange, so no index is ever published under a stale session.
#[derive(Debug)]
pub struct EntityAllocator {
    /// Packed session and last issued index.
    position: AtomicU64,
    /// OS-seeded CSPRNG for sessions and tokens.
    rng: Mutex<StdRng>,
    /// Phase check for `spawn`.
    guard: AccessGuard,
}

impl EntityAllocator {
    /// Creates an allocator with a fresh random session id.
    ///
    /// # Errors
    ///
    /// Returns `EntropyUnavailable` if the OS random source fails.
    pub fn new(guard: AccessGuard) -> RuntimeResult<Self> {
        let mut rng = seeded_rng()?;
        let session = rng.gen::<u16>();
        Ok(Self::from_parts(session, 0, rng, guard))
    }

    /// Creates an allocator that continues from a saved state.
    ///
    /// # Errors
    ///
    /// Returns `EntropyUnavailable` if the OS random source fails.
    pub fn resume(state: AllocatorState, guard: AccessGuard) -> RuntimeResult<Self> {
        let rng = seeded_rng()?;
        Ok(Self::from_parts(state.session, state.counter, rng, guard))
    }

    fn from_parts(session: u16, counter: u32, rng: StdRng, guard: AccessGuard) -> Self {
        tracing::debug!("entity allocator session {:04X} at index {}", session, counter);
        Self {
            position: AtomicU64::new(pack(session, counter)),
            rng: Mutex::new(rng),
            guard,
        }
    }

    /// Issues a new identifier.
    ///
    /// # Errors
    ///
    /// Returns `AccessViolation` outside the spawn stages.
    pub fn spawn(&self) -> RuntimeResult<EntityId> {
        self.guard.enforce(Operation::SpawnEntity)?;

        let mut current = self.position.load(Ordering::Acquire);
        let (session, index) = loop {
            let (session, counter) = unpack(current);
            let index = counter.wrapping_add(1);
            let next_session = if index == 0 {
                self.draw_session(session)
            } else {
                session
            };

            match self.position.compare_exchange_weak(
                current,
                pack(next_session, index),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if index == 0 {
                        tracing::info!(
                            "entity index wrapped; session {:04X} -> {:04X}",
                            session,
                            next_session
                        );
                    }
                    break (next_session, index);
                }
                Err(actual) => current = actual,
            }
        };

        let token = self.rng.lock().gen::<u16>();
        Ok(EntityId::from_parts(session, token, index))
    }

    /// Snapshot of the current position.
    #[must_use]
    pub fn state(&self) -> AllocatorState {
        let (session, counter) = unpack(self.position.load(Ordering::Acquire));
        AllocatorState { session, counter }
    }

    /// Current session id.
    #[inline]
    #[must_use]
    pub fn session(&self) -> u16 {
        unpack(self.position.load(Ordering::Acquire)).0
    }

    /// Draws a session id different from `old`.
    fn draw_session(&self, old: u16) -> u16 {
        let mut rng = self.rng.lock();
        loop {
            let candidate = rng.gen::<u16>();
            if candidate != old {
                return candidate;
            }
        }
    }
}

#[inline]
const fn pack(session: u16, counter: u32) -> u64 {
    ((session as u64) << 32) | counter as u64
}

#[inline]
const fn unpack(position: u64) -> (u16, u32) {
    ((position >> 32) as u16, position as u32)
}

fn seeded_rng() -> RuntimeResult<StdRng> {
    let mut seed = <StdRng as SeedableRng>::Seed::default();
    getrandom::fill(&mut seed).map_err(|e| RuntimeError::EntropyUnavailable(e.to_string()))?;
    Ok(StdRng::from_seed(seed))
}
