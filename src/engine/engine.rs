use std::{
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    thread,
};

use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::oneshot;

use super::var::{Access, Var};
use crate::error::{KvError, Result};

enum Task {
    Sync(Box<dyn FnOnce() + Send>),
    Async(Box<dyn FnOnce(Completion) + Send>),
}

/// A scheduled operation waiting for access to its vars.
pub(super) struct Opr {
    pending: AtomicUsize,
    task: Mutex<Option<Task>>,
    reads: Vec<Var>,
    writes: Vec<Var>,
}

struct EngineInner {
    pool: ThreadPool,
    next_var: AtomicU64,
    outstanding: Mutex<usize>,
    idle: Condvar,
}

/// Dependency-tracked scheduler.
///
/// Operations are pushed with a read set and a write set of `Var`s and run on the
/// engine's thread pool as soon as every earlier operation they conflict with has
/// completed. Pushing never blocks, only the explicit wait methods do.
#[derive(Clone)]
pub struct Engine(Arc<EngineInner>);

impl Engine {
    /// Creates a new `Engine`.
    ///
    /// # Arguments
    /// * `threads` - The amount of worker threads executing operations.
    ///
    /// # Returns
    /// A new `Engine` or an error if the thread pool couldn't be started.
    pub fn new(threads: NonZeroUsize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .thread_name(|i| format!("kvstore-engine-{i}"))
            .build()
            .map_err(|e| KvError::Engine(e.to_string()))?;

        debug!(threads = threads.get(); "engine started");

        Ok(Self(Arc::new(EngineInner {
            pool,
            next_var: AtomicU64::new(0),
            outstanding: Mutex::new(0),
            idle: Condvar::new(),
        })))
    }

    /// Creates a new `Engine` with one thread per available core.
    pub fn with_default_threads() -> Result<Self> {
        let threads = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::new(threads)
    }

    /// Whether both handles drive the same engine.
    pub fn ptr_eq(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Creates a new dependency variable.
    pub fn new_var(&self) -> Var {
        Var::new(self.0.next_var.fetch_add(1, Ordering::Relaxed))
    }

    /// Schedules `f` after every conflicting operation pushed before it.
    ///
    /// A var present in both sets is treated as written.
    ///
    /// # Arguments
    /// * `reads` - The vars `f` reads.
    /// * `writes` - The vars `f` mutates.
    /// * `f` - The operation.
    pub fn push<F>(&self, reads: &[Var], writes: &[Var], f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(reads, writes, Task::Sync(Box::new(f)));
    }

    /// Same as `push`, but the operation only completes once the `Completion`
    /// handed to `f` is signaled or dropped, which may happen on another thread.
    pub fn push_async<F>(&self, reads: &[Var], writes: &[Var], f: F)
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.schedule(reads, writes, Task::Async(Box::new(f)));
    }

    /// Blocks until every operation pushed so far on `var` has completed, reads included.
    ///
    /// # Panics
    /// If called from within an async runtime, use `wait_for_var_async` there.
    /// Calling it from inside an engine operation deadlocks.
    pub fn wait_for_var(&self, var: &Var) {
        let (tx, rx) = oneshot::channel();
        self.push(&[], std::slice::from_ref(var), move || {
            let _ = tx.send(());
        });

        let _ = rx.blocking_recv();
    }

    /// Async version of `wait_for_var`.
    pub async fn wait_for_var_async(&self, var: &Var) {
        let (tx, rx) = oneshot::channel();
        self.push(&[], std::slice::from_ref(var), move || {
            let _ = tx.send(());
        });

        let _ = rx.await;
    }

    /// Blocks until the engine has no outstanding operations.
    pub fn wait_for_all(&self) {
        let mut outstanding = self.0.outstanding.lock();

        while *outstanding > 0 {
            self.0.idle.wait(&mut outstanding);
        }
    }

    fn schedule(&self, reads: &[Var], writes: &[Var], task: Task) {
        let mut writes = writes.to_vec();
        writes.sort_by_key(Var::id);
        writes.dedup_by_key(|var| var.id());

        let mut reads: Vec<_> = reads
            .iter()
            .filter(|var| writes.binary_search_by_key(&var.id(), Var::id).is_err())
            .cloned()
            .collect();
        reads.sort_by_key(Var::id);
        reads.dedup_by_key(|var| var.id());

        // One extra count guards against dispatching before every var is appended.
        let opr = Arc::new(Opr {
            pending: AtomicUsize::new(reads.len() + writes.len() + 1),
            task: Mutex::new(Some(task)),
            reads,
            writes,
        });

        *self.0.outstanding.lock() += 1;

        for var in &opr.reads {
            self.dispatch(var.append(Arc::clone(&opr), Access::Read));
        }

        for var in &opr.writes {
            self.dispatch(var.append(Arc::clone(&opr), Access::Write));
        }

        self.dispatch(vec![opr]);
    }

    fn dispatch(&self, granted: Vec<Arc<Opr>>) {
        for opr in granted {
            if opr.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                let engine = self.clone();
                self.0.pool.spawn(move || engine.run(opr));
            }
        }
    }

    fn run(self, opr: Arc<Opr>) {
        let Some(task) = opr.task.lock().take() else {
            return;
        };

        let outcome = match task {
            Task::Sync(f) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(f));
                self.complete(&opr);
                outcome
            }
            Task::Async(f) => {
                let completion = Completion {
                    engine: self.clone(),
                    opr: Some(opr),
                };

                panic::catch_unwind(AssertUnwindSafe(move || f(completion)))
            }
        };

        if outcome.is_err() {
            error!("engine operation panicked");
        }
    }

    fn complete(&self, opr: &Opr) {
        for var in &opr.reads {
            self.dispatch(var.release(Access::Read));
        }

        for var in &opr.writes {
            self.dispatch(var.release(Access::Write));
        }

        let mut outstanding = self.0.outstanding.lock();
        *outstanding -= 1;

        if *outstanding == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Signals the end of an operation pushed with `Engine::push_async`.
///
/// Dropping it without calling `done` completes the operation as well.
pub struct Completion {
    engine: Engine,
    opr: Option<Arc<Opr>>,
}

impl Completion {
    /// Marks the operation as completed, releasing its vars.
    pub fn done(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(opr) = self.opr.take() {
            self.engine.complete(&opr);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.finish();
    }
}
