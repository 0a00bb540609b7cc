//! Step-indexed ensemble snapshots.
//!
//! A [`Snapshot`] is the serialized form of every instance in an ensemble
//! after exactly `step` steps. Capturing happens before the ensemble is
//! mutated again, so restoring a snapshot and stepping `n` times yields
//! the same bytes as the original run did at `step + n`.
//!
//! The [`SnapshotStore`] keeps one [`Frame`] per step, contiguous from
//! step 0 up to its head. Frames are immutable; moving backwards discards
//! everything after the restore point rather than editing it.
//!
//! Blobs are `serde_json` bytes behind an [`Arc`], so cloning a frame is
//! cheap and a restored ensemble shares nothing with the stored one.

use std::sync::Arc;

use serde_json::Value;

use crate::model::Model;

/// Errors that can occur while capturing or restoring a snapshot.
///
/// Any of these means the model does not round-trip through its own
/// serialized form, which the session cannot work around.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The ensemble could not be serialized.
    #[error("failed to capture step {step}: {source}")]
    Capture {
        /// Step being captured.
        step: u64,
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// A stored blob could not be turned back into instances.
    #[error("failed to restore step {step}: {source}")]
    Restore {
        /// Step being restored.
        step: u64,
        /// The underlying deserialization error.
        source: serde_json::Error,
    },

    /// A frame was pushed out of order.
    #[error("frame for step {got} pushed but the next expected step is {expected}")]
    OutOfOrder {
        /// The step the store expected next.
        expected: u64,
        /// The step that was pushed.
        got: u64,
    },

    /// A step that is not in the store was requested.
    #[error("no snapshot for step {step}")]
    Missing {
        /// The requested step.
        step: u64,
    },
}

/// Serialized state of a whole ensemble at one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    step: u64,
    bytes: Arc<[u8]>,
}

impl Snapshot {
    /// Serialize every instance of the ensemble.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Capture`] if any instance fails to
    /// serialize.
    pub fn capture<M: Model>(step: u64, instances: &[M]) -> Result<Self, SnapshotError> {
        let bytes = serde_json::to_vec(instances)
            .map_err(|source| SnapshotError::Capture { step, source })?;
        Ok(Self {
            step,
            bytes: Arc::from(bytes),
        })
    }

    /// Rebuild a fresh ensemble from the stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Restore`] if the bytes do not deserialize
    /// into `M`.
    pub fn restore<M: Model>(&self) -> Result<Vec<M>, SnapshotError> {
        serde_json::from_slice(&self.bytes).map_err(|source| SnapshotError::Restore {
            step: self.step,
            source,
        })
    }

    /// The step this snapshot was taken at.
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Size of the serialized blob in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw serialized bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// One step of session history.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Ensemble state after this step.
    pub snapshot: Snapshot,
    /// The `model_state` records for this step, one per instance.
    pub state: Vec<Value>,
    /// Whether any instance was still running at this step.
    pub running: bool,
}

impl Frame {
    /// The step this frame belongs to.
    pub const fn step(&self) -> u64 {
        self.snapshot.step
    }
}

/// Contiguous step-indexed history, from step 0 to [`head`](Self::head).
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    frames: Vec<Frame>,
    bytes: usize,
}

impl SnapshotStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            frames: Vec::new(),
            bytes: 0,
        }
    }

    /// Append the frame for the next step.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::OutOfOrder`] unless the frame's step is
    /// exactly one past the current head (or 0 for an empty store).
    pub fn push(&mut self, frame: Frame) -> Result<(), SnapshotError> {
        let expected = self.next_step();
        if frame.step() != expected {
            return Err(SnapshotError::OutOfOrder {
                expected,
                got: frame.step(),
            });
        }
        self.bytes = self.bytes.saturating_add(frame.snapshot.len());
        self.frames.push(frame);
        Ok(())
    }

    /// The frame stored for `step`, if any.
    pub fn get(&self, step: u64) -> Option<&Frame> {
        usize::try_from(step).ok().and_then(|i| self.frames.get(i))
    }

    /// Like [`get`](Self::get), but a missing frame is an error.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Missing`] if `step` is beyond the head.
    pub fn require(&self, step: u64) -> Result<&Frame, SnapshotError> {
        self.get(step).ok_or(SnapshotError::Missing { step })
    }

    /// The most recent frame.
    pub fn latest(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Step of the most recent frame, or `None` when empty.
    pub fn head(&self) -> Option<u64> {
        self.latest().map(Frame::step)
    }

    /// Keep steps `0..=step`, discarding everything after.
    pub fn truncate_after(&mut self, step: u64) {
        let keep = usize::try_from(step)
            .ok()
            .and_then(|s| s.checked_add(1))
            .unwrap_or(usize::MAX);
        self.drop_tail(keep);
    }

    /// Keep steps `0..step`, discarding `step` and everything after.
    pub fn discard_from(&mut self, step: u64) {
        let keep = usize::try_from(step).unwrap_or(usize::MAX);
        self.drop_tail(keep);
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.bytes = 0;
    }

    /// Number of stored frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the store holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total serialized bytes held by the store.
    pub const fn total_bytes(&self) -> usize {
        self.bytes
    }

    fn drop_tail(&mut self, keep: usize) {
        let dropped = self
            .frames
            .get(keep..)
            .unwrap_or_default()
            .iter()
            .fold(0_usize, |acc, f| acc.saturating_add(f.snapshot.len()));
        self.bytes = self.bytes.saturating_sub(dropped);
        self.frames.truncate(keep);
    }

    fn next_step(&self) -> u64 {
        self.head().map_or(0, |h| h.saturating_add(1))
    }
}
