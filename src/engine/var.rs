use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;

use super::engine::Opr;

/// How an operation touches a `Var`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Access {
    Read,
    Write,
}

#[derive(Default)]
struct VarState {
    queue: VecDeque<(Arc<Opr>, Access)>,
    running_reads: usize,
    writing: bool,
}

struct VarInner {
    id: u64,
    state: Mutex<VarState>,
}

/// A dependency variable, every operation scheduled on the engine declares
/// which vars it reads and which ones it writes.
///
/// Operations queued on a var are granted in order: consecutive reads run
/// concurrently, a write runs alone once everything before it finished.
#[derive(Clone)]
pub struct Var(Arc<VarInner>);

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Var").field(&self.0.id).finish()
    }
}

impl Var {
    /// Creates a new `Var`, only the engine hands out ids.
    pub(super) fn new(id: u64) -> Self {
        Self(Arc::new(VarInner {
            id,
            state: Mutex::new(VarState::default()),
        }))
    }

    /// The engine-wide unique id of this var.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Enqueues `opr` behind every operation already registered on this var.
    ///
    /// # Returns
    /// The operations granted access as a consequence.
    pub(super) fn append(&self, opr: Arc<Opr>, access: Access) -> Vec<Arc<Opr>> {
        let mut state = self.0.state.lock();
        state.queue.push_back((opr, access));
        grant(&mut state)
    }

    /// Releases the access held by a finished operation.
    ///
    /// # Returns
    /// The operations granted access as a consequence.
    pub(super) fn release(&self, access: Access) -> Vec<Arc<Opr>> {
        let mut state = self.0.state.lock();

        match access {
            Access::Read => state.running_reads -= 1,
            Access::Write => state.writing = false,
        }

        grant(&mut state)
    }
}

fn grant(state: &mut VarState) -> Vec<Arc<Opr>> {
    let mut granted = Vec::new();

    while let Some(&(_, access)) = state.queue.front() {
        match access {
            Access::Read if !state.writing => state.running_reads += 1,
            Access::Write if !state.writing && state.running_reads == 0 => state.writing = true,
            _ => break,
        }

        if let Some((opr, _)) = state.queue.pop_front() {
            granted.push(opr);
        }
    }

    granted
}
