use std::mem;

use super::Waiter;
use crate::error::{KvError, Result};

/// The aggregation state of a key.
///
/// Contributions pushed while the aggregator is enabled are summed into the
/// buffer of the open round. Once the coordinator's round size is reached the
/// sum is merged once and the round closes, waking the pulls parked on it.
#[derive(Default)]
pub(crate) struct Round {
    index: u64,
    pending: usize,
    buffer: Option<Box<[f32]>>,
    waiters: Vec<Waiter>,
    aborted: Option<(u64, KvError)>,
}

impl Round {
    /// Adds a contribution to the open round.
    ///
    /// # Arguments
    /// * `value` - The contribution, its length must match the key's.
    ///
    /// # Returns
    /// The index of the round `value` contributed to.
    pub fn accumulate(&mut self, value: &[f32]) -> u64 {
        // No rayon under the merge lock, a stolen engine job may contend for it.
        match &mut self.buffer {
            Some(buffer) => buffer.iter_mut().zip(value).for_each(|(acc, x)| *acc += x),
            None => self.buffer = Some(value.into()),
        }

        self.pending += 1;
        self.index
    }

    /// The amount of contributions in the open round.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// The index of the open round.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn is_full(&self, round_size: usize) -> bool {
        self.pending >= round_size
    }

    /// Takes the summed contributions out of the open round.
    pub fn take_sum(&mut self) -> Option<Box<[f32]>> {
        self.buffer.take()
    }

    /// Closes the open round.
    ///
    /// # Arguments
    /// * `outcome` - The result of merging the round, an error marks it aborted.
    ///
    /// # Returns
    /// The pulls that were waiting for this round.
    pub fn finish(&mut self, outcome: Result<()>) -> Vec<Waiter> {
        let closed = self.index;

        self.index += 1;
        self.pending = 0;
        self.buffer = None;

        if let Err(err) = outcome {
            self.aborted = Some((closed, err));
        }

        self.drain(|waiter| waiter.round <= closed)
    }

    /// Whether the round of index `round` has been closed.
    pub fn is_closed(&self, round: u64) -> bool {
        round < self.index
    }

    /// The error that aborted the round of index `round`, if it was the last one aborted.
    pub fn failure(&self, round: u64) -> Option<KvError> {
        match &self.aborted {
            Some((aborted, err)) if *aborted == round => Some(err.clone()),
            _ => None,
        }
    }

    pub fn park(&mut self, waiter: Waiter) {
        self.waiters.push(waiter);
    }

    /// Removes the parked pulls matching `pred`.
    pub fn drain<P>(&mut self, mut pred: P) -> Vec<Waiter>
    where
        P: FnMut(&Waiter) -> bool,
    {
        let (drained, kept) = mem::take(&mut self.waiters)
            .into_iter()
            .partition(|waiter| pred(waiter));

        self.waiters = kept;
        drained
    }
}
