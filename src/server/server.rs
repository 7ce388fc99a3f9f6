use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::{
    Key,
    aggregation::{self, Waiter},
    array::Array,
    coordination::Coordinator,
    engine::Completion,
    error::{KvError, Result},
    registry::{Entry, ValueRegistry},
    updater::UpdaterFactory,
};

/// The state shared by every node of a group: the registered values, the
/// updater merging contributions into them and the coordinator deciding
/// when a round is complete.
pub struct Server {
    registry: ValueRegistry,
    updater: RwLock<UpdaterFactory>,
    aggregator: AtomicBool,
    coordinator: Coordinator,
}

impl Server {
    /// Creates a new `Server`.
    ///
    /// # Arguments
    /// * `group_size` - The amount of nodes that push to this server every round.
    pub fn new(group_size: NonZeroUsize) -> Self {
        Self {
            registry: ValueRegistry::new(),
            updater: RwLock::new(UpdaterFactory::default()),
            aggregator: AtomicBool::new(true),
            coordinator: Coordinator::new(group_size),
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &ValueRegistry {
        &self.registry
    }

    /// Replaces the updater used by keys initialized from now on.
    ///
    /// # Returns
    /// `UpdaterLocked` if any key was already initialized.
    pub fn set_updater(&self, factory: UpdaterFactory) -> Result<()> {
        let mut updater = self.updater.write();

        if self.registry.is_sealed() {
            return Err(KvError::UpdaterLocked);
        }

        *updater = factory;
        Ok(())
    }

    /// Switches between summing a whole round before merging (enabled) and
    /// merging every contribution on its own (disabled).
    pub fn set_aggregator(&self, enabled: bool) {
        self.aggregator.store(enabled, Ordering::Release);
        debug!(enabled = enabled; "aggregator toggled");
    }

    pub fn is_aggregating(&self) -> bool {
        self.aggregator.load(Ordering::Acquire)
    }

    /// Registers `key` with its starting value, building its updater.
    pub fn init(&self, key: Key, shape: &[usize], value: Vec<f32>) -> Result<()> {
        // Held until the entry is in, so `set_updater` can't slip in between.
        let factory = self.updater.read();
        let len = shape.iter().product();

        self.registry.init(key, shape, value, factory.build(len))?;
        debug!(key = key, len = len; "key initialized");
        Ok(())
    }

    /// Looks up the entry of `key`.
    pub fn entry(&self, key: Key) -> Result<Arc<Entry>> {
        self.registry.get(key)
    }

    pub fn merge_count(&self, key: Key) -> Result<u64> {
        Ok(self.registry.get(key)?.merge_count())
    }

    /// Hands a contribution to `entry`.
    ///
    /// With the aggregator enabled the contribution is summed into the open
    /// round, the round is merged once it holds as many contributions as the
    /// coordinator expects. Otherwise it's merged right away.
    ///
    /// # Arguments
    /// * `entry` - The entry of the pushed key.
    /// * `shape` - The shape of the pushed value.
    /// * `value` - The pushed value.
    ///
    /// # Returns
    /// The index of the round the value contributed to, `None` when merged
    /// right away, or the merge failure.
    pub(crate) fn push(&self, entry: &Entry, shape: &[usize], value: &[f32]) -> Result<Option<u64>> {
        let key = entry.key();
        let mut state = entry.merge();

        if entry.is_cleared() {
            return Err(KvError::Aborted { key });
        }

        let aggregating = self.is_aggregating();

        if shape != entry.shape() {
            let err = KvError::ShapeMismatch {
                expected: entry.shape().to_vec(),
                got: shape.to_vec(),
            };

            let round = state.round.index();
            let waiters = if aggregating && state.round.pending() > 0 {
                state.round.finish(Err(err.clone()))
            } else {
                Vec::new()
            };

            drop(state);
            warn!(key = key, round = round; "{err}, aborting the open round");
            resolve(entry, waiters, Some(&err));
            return Err(err);
        }

        if !aggregating {
            return match entry.apply(&mut state, value) {
                Ok(()) => Ok(None),
                Err(e) => {
                    warn!(key = key; "online merge failed: {e}");
                    Err(e)
                }
            };
        }

        let round = state.round.accumulate(value);

        if !state.round.is_full(self.coordinator.round_size(key)) {
            return Ok(Some(round));
        }

        let outcome = match state.round.take_sum() {
            Some(sum) => entry.apply(&mut state, &sum),
            None => Ok(()),
        };

        let waiters = state.round.finish(outcome.clone());
        drop(state);

        match &outcome {
            Ok(()) => debug!(key = key, round = round, waiters = waiters.len(); "round merged"),
            Err(e) => warn!(key = key, round = round; "round aborted: {e}"),
        }

        resolve(entry, waiters, outcome.as_ref().err());
        outcome.map(|_| Some(round))
    }

    /// Copies the value of `entry` into `out` once `round` is closed.
    ///
    /// If the round is still open the pull is parked and `completion` is only
    /// signaled when the round closes or the node stops.
    ///
    /// # Arguments
    /// * `entry` - The entry of the pulled key.
    /// * `round` - The round of the node's last push of the key, if any.
    /// * `rank` - The rank of the pulling node.
    /// * `out` - The array receiving the value.
    /// * `completion` - The completion of the pull's engine operation.
    /// * `active` - Whether the pulling node is still running.
    pub(crate) fn pull(
        &self,
        entry: &Entry,
        round: Option<u64>,
        rank: usize,
        out: Array,
        completion: Completion,
        active: &AtomicBool,
    ) {
        let key = entry.key();
        let mut state = entry.merge();

        // Checked under the merge lock so a stopping node drains every pull it
        // parked.
        let failure = if !active.load(Ordering::Acquire) {
            Some(KvError::Aborted { key })
        } else {
            match round {
                Some(round) if !entry.is_cleared() && !state.round.is_closed(round) => {
                    debug!(key = key, round = round, rank = rank; "pull parked");
                    state.round.park(Waiter {
                        round,
                        rank,
                        out,
                        completion,
                    });
                    return;
                }
                Some(round) => state.round.failure(round),
                None => None,
            }
        };

        drop(state);
        aggregation::deliver(entry, &out, failure.as_ref());
        completion.done();
    }

    /// Aborts every pull parked by the node of `rank`.
    pub(crate) fn release(&self, rank: usize) {
        for entry in self.registry.entries() {
            let waiters = entry.merge().round.drain(|waiter| waiter.rank == rank);

            if !waiters.is_empty() {
                warn!(key = entry.key(), rank = rank, pulls = waiters.len(); "aborting parked pulls");
            }

            let err = KvError::Aborted { key: entry.key() };
            resolve(&entry, waiters, Some(&err));
        }
    }

    /// Drops every key, aborting the pulls still parked on them, and puts the
    /// updater and the aggregator back to their defaults.
    pub fn clear(&self) {
        let mut updater = self.updater.write();

        for (entry, waiters) in self.registry.clear() {
            let err = KvError::Aborted { key: entry.key() };
            resolve(&entry, waiters, Some(&err));
        }

        *updater = UpdaterFactory::default();
        self.aggregator.store(true, Ordering::Release);
        info!("server cleared");
    }
}

fn resolve(entry: &Entry, waiters: Vec<Waiter>, failure: Option<&KvError>) {
    for waiter in waiters {
        waiter.resolve(entry, failure);
    }
}
