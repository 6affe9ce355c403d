//! Snowflake-style identifier generation.
//!
//! Every review, reply and appeal takes its identifier from an [`IdGenerator`].
//! Identifiers are positive `i64` values laid out as
//!
//! ```text
//! 0 | timestamp (41 bits) | node (10 bits) | sequence (12 bits)
//! ```
//!
//! where the timestamp counts milliseconds since [`EPOCH_MS`]. Two generators
//! never collide as long as they run with distinct node numbers.
//!
//! # Lifecycle
//!
//! A generator is constructed once per process (normally from configuration at
//! startup) and shared behind an `Arc`. There is no global instance and no
//! fallback node: code that needs identifiers must be handed a generator.
//!
//! [`EPOCH_MS`] is baked into every persisted identifier. Changing it after
//! identifiers have been stored makes [`decompose`] report wrong timestamps.

use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reference instant for identifier timestamps: 2025-09-06T00:00:00Z.
pub const EPOCH_MS: i64 = 1_757_116_800_000;

pub const NODE_BITS: u32 = 10;
pub const SEQUENCE_BITS: u32 = 12;

/// Largest valid node number (1023).
pub const MAX_NODE: i64 = (1 << NODE_BITS) - 1;

const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;
const NODE_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = NODE_BITS + SEQUENCE_BITS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdGeneratorError {
    #[error("node number {0} is outside the valid range 0..=1023")]
    NodeOutOfRange(i64),

    #[error("system clock reads {now_ms} ms since the Unix epoch, which is before the identifier epoch")]
    ClockBeforeEpoch { now_ms: i64 },
}

/// Per-millisecond sequence state, guarded by the generator's mutex.
#[derive(Debug, Default)]
struct Sequence {
    last_ms: i64,
    step: i64,
}

/// Thread-safe identifier generator bound to one node number.
#[derive(Debug)]
pub struct IdGenerator {
    node: i64,
    /// Monotonic reference point taken at construction.
    anchor: Instant,
    /// Milliseconds since [`EPOCH_MS`] at the moment `anchor` was taken.
    anchor_ms: i64,
    sequence: Mutex<Sequence>,
}

impl IdGenerator {
    /// Create a generator for `node`.
    ///
    /// Fails if the node number is outside `0..=1023` or if the wall clock is
    /// set earlier than [`EPOCH_MS`].
    pub fn new(node: i64) -> Result<Self, IdGeneratorError> {
        if !(0..=MAX_NODE).contains(&node) {
            return Err(IdGeneratorError::NodeOutOfRange(node));
        }

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        if now_ms < EPOCH_MS {
            return Err(IdGeneratorError::ClockBeforeEpoch { now_ms });
        }

        Ok(Self {
            node,
            anchor: Instant::now(),
            anchor_ms: now_ms - EPOCH_MS,
            sequence: Mutex::new(Sequence::default()),
        })
    }

    pub fn node(&self) -> i64 {
        self.node
    }

    /// Milliseconds since the epoch, read from the monotonic clock so that
    /// wall-clock adjustments never move time backwards.
    fn elapsed_ms(&self) -> i64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as i64
    }

    /// Produce the next identifier.
    ///
    /// Safe to call from any number of threads. If 4096 identifiers have
    /// already been issued in the current millisecond, waits for the next one.
    pub fn next_id(&self) -> i64 {
        // The state is two integers that are always consistent between
        // statements, so a poisoned lock is still usable.
        let mut seq = self
            .sequence
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut now = self.elapsed_ms();
        if now <= seq.last_ms {
            now = seq.last_ms;
            seq.step = (seq.step + 1) & MAX_SEQUENCE;
            if seq.step == 0 {
                // Sequence exhausted for this millisecond.
                while now <= seq.last_ms {
                    std::hint::spin_loop();
                    now = self.elapsed_ms();
                }
            }
        } else {
            seq.step = 0;
        }
        seq.last_ms = now;

        (now << TIMESTAMP_SHIFT) | (self.node << NODE_SHIFT) | seq.step
    }
}

/// Fields recovered from an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub node: i64,
    pub sequence: i64,
}

impl IdParts {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

/// Split an identifier back into its timestamp, node and sequence.
pub fn decompose(id: i64) -> IdParts {
    IdParts {
        timestamp_ms: (id >> TIMESTAMP_SHIFT) + EPOCH_MS,
        node: (id >> NODE_SHIFT) & MAX_NODE,
        sequence: id & MAX_SEQUENCE,
    }
}
