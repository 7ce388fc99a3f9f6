use crate::{
    array::Array,
    engine::Completion,
    error::{KvError, Result},
    registry::Entry,
};

/// A pull parked until the round it depends on closes.
///
/// Holding the `Completion` keeps the engine operation of the pull open, so
/// every later operation on the node's key stream and on `out` stays queued.
pub(crate) struct Waiter {
    pub round: u64,
    pub rank: usize,
    pub out: Array,
    pub completion: Completion,
}

impl Waiter {
    /// Delivers the stored value (or `failure`) into the waiting array and
    /// completes the pull.
    pub fn resolve(self, entry: &Entry, failure: Option<&KvError>) {
        deliver(entry, &self.out, failure);
        self.completion.done();
    }
}

/// Copies the value of `entry` into `out`, recording any failure on `out` so
/// it surfaces when the caller waits on it.
///
/// Must run inside an engine operation that declared `out` as written.
pub(crate) fn deliver(entry: &Entry, out: &Array, failure: Option<&KvError>) {
    if let Err(e) = try_deliver(entry, out, failure) {
        out.fail(e);
    }
}

fn try_deliver(entry: &Entry, out: &Array, failure: Option<&KvError>) -> Result<()> {
    if let Some(err) = failure {
        return Err(err.clone());
    }

    if out.shape() != entry.shape() {
        return Err(KvError::ShapeMismatch {
            expected: entry.shape().to_vec(),
            got: out.shape().to_vec(),
        });
    }

    entry.copy_to(&mut out.data_mut())
}
