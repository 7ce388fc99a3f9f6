use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::{
    Key,
    aggregation::{Round, Waiter},
    error::{KvError, Result},
    updater::Updater,
};

/// Everything that changes when a contribution is merged, guarded by one lock
/// so merges of a key never overlap.
pub(crate) struct MergeState {
    pub updater: Box<dyn Updater>,
    pub round: Round,
    pub merges: u64,
}

/// The value stored for a single key.
pub struct Entry {
    key: Key,
    shape: Box<[usize]>,
    stored: RwLock<Box<[f32]>>,
    merge: Mutex<MergeState>,
    cleared: AtomicBool,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("shape", &self.shape)
            .field("cleared", &self.is_cleared())
            .finish_non_exhaustive()
    }
}

impl Entry {
    pub(super) fn new(key: Key, shape: &[usize], value: Vec<f32>, updater: Box<dyn Updater>) -> Self {
        Self {
            key,
            shape: shape.into(),
            stored: RwLock::new(value.into_boxed_slice()),
            merge: Mutex::new(MergeState {
                updater,
                round: Round::default(),
                merges: 0,
            }),
            cleared: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots the stored value.
    ///
    /// # Returns
    /// An `Aborted` error if the entry was cleared.
    pub fn get(&self) -> Result<Vec<f32>> {
        self.check_live()?;
        Ok(self.stored.read().to_vec())
    }

    /// Overwrites the stored value.
    ///
    /// # Returns
    /// An `Aborted` error if the entry was cleared or a `ShapeMismatch` if `value`
    /// doesn't have the entry's length.
    pub fn set(&self, value: Vec<f32>) -> Result<()> {
        self.check_live()?;

        if value.len() != self.len() {
            return Err(KvError::length_mismatch(self.len(), value.len()));
        }

        *self.stored.write() = value.into_boxed_slice();
        Ok(())
    }

    /// Copies the stored value into `out`.
    pub(crate) fn copy_to(&self, out: &mut [f32]) -> Result<()> {
        self.check_live()?;

        let stored = self.stored.read();

        if stored.len() != out.len() {
            return Err(KvError::length_mismatch(stored.len(), out.len()));
        }

        out.copy_from_slice(&stored);
        Ok(())
    }

    /// The amount of updater invocations applied to this entry.
    pub fn merge_count(&self) -> u64 {
        self.merge.lock().merges
    }

    pub(crate) fn merge(&self) -> MutexGuard<'_, MergeState> {
        self.merge.lock()
    }

    /// Runs the updater on a copy of the stored value and commits it only if the
    /// updater succeeded, so a failed merge leaves the stored value untouched.
    ///
    /// # Arguments
    /// * `state` - The locked merge state of this entry.
    /// * `recv` - The value to merge.
    pub(crate) fn apply(&self, state: &mut MergeState, recv: &[f32]) -> Result<()> {
        let mut next = self.get()?;
        state.updater.update(recv, &mut next)?;
        self.set(next)?;
        state.merges += 1;
        Ok(())
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::Acquire)
    }

    /// Marks the entry as cleared.
    ///
    /// # Returns
    /// The pulls that were waiting on this entry.
    pub(super) fn clear(&self) -> Vec<Waiter> {
        let mut state = self.merge.lock();
        self.cleared.store(true, Ordering::Release);
        state.round.drain(|_| true)
    }

    fn check_live(&self) -> Result<()> {
        if self.is_cleared() {
            return Err(KvError::Aborted { key: self.key });
        }

        Ok(())
    }
}
