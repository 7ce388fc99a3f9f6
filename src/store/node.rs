use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    Key,
    array::{Array, Context},
    coordination::NodeIdentity,
    engine::{Engine, Var},
    error::{KvError, Result},
    server::Server,
};

/// The per key state of a node. Every push and pull of the key writes `var`,
/// so the node's operations on the key run in the order they were issued.
#[derive(Clone)]
struct KeyStream {
    var: Var,
    last_round: Arc<Mutex<Option<u64>>>,
}

/// A member of a group bound to a set of devices.
pub(super) struct Node {
    identity: NodeIdentity,
    devices: Vec<Context>,
    engine: Engine,
    server: Arc<Server>,
    streams: Mutex<HashMap<Key, KeyStream>>,
    active: Arc<AtomicBool>,
}

impl Node {
    /// Joins the group of `server`.
    ///
    /// # Returns
    /// A new `Node` or `GroupFull` if every rank of the group is taken.
    pub fn join(engine: Engine, server: Arc<Server>, devices: Vec<Context>) -> Result<Self> {
        let identity = server.coordinator().join()?;

        info!(
            rank = identity.rank(),
            group_size = identity.group_size(),
            devices = devices.len();
            "devices bound"
        );

        Ok(Self {
            identity,
            devices,
            engine,
            server,
            streams: Mutex::new(HashMap::new()),
            active: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Registers `key` with the contents of `value`, blocking until every
    /// operation pending on `value` completed.
    pub fn init(&self, key: Key, value: &Array) -> Result<()> {
        self.check_array(value)?;
        let data = value.to_vec()?;
        self.server.init(key, value.shape(), data)
    }

    /// Schedules the contribution of `value` to `key`.
    ///
    /// Merge failures are recorded on `value`.
    pub fn push(&self, key: Key, value: &Array) -> Result<()> {
        let entry = self.server.entry(key)?;
        self.check_array(value)?;

        let stream = self.stream(key);
        let server = Arc::clone(&self.server);
        let active = Arc::clone(&self.active);
        let value = value.clone();

        self.engine
            .push(&[value.var().clone()], &[stream.var.clone()], move || {
                if !active.load(Ordering::Acquire) {
                    value.fail(KvError::Aborted { key });
                    return;
                }

                let outcome = server.push(&entry, value.shape(), &value.data());

                // Online merges keep the round of an earlier aggregated push.
                match outcome {
                    Ok(Some(round)) => *stream.last_round.lock() = Some(round),
                    Ok(None) => {}
                    Err(e) => value.fail(e),
                }
            });

        Ok(())
    }

    /// Schedules a copy of the value of `key` into `out`, after the round of
    /// the node's last push of `key` closed.
    ///
    /// Later pulls without a push in between are ordered after this one, so
    /// they don't wait on the round again.
    pub fn pull(&self, key: Key, out: &Array) -> Result<()> {
        let entry = self.server.entry(key)?;
        self.check_array(out)?;

        let stream = self.stream(key);
        let server = Arc::clone(&self.server);
        let active = Arc::clone(&self.active);
        let rank = self.identity.rank();
        let out = out.clone();

        self.engine.push_async(
            &[],
            &[stream.var.clone(), out.var().clone()],
            move |completion| {
                let round = stream.last_round.lock().take();
                server.pull(&entry, round, rank, out, completion, &active);
            },
        );

        Ok(())
    }

    /// Leaves the group, aborting every operation of this node that didn't
    /// run yet. The server is cleared once its last member leaves.
    pub fn stop(&self) {
        let rank = self.identity.rank();

        self.active.store(false, Ordering::Release);
        self.server.release(rank);

        let remaining = self.server.coordinator().leave(rank);
        debug!(rank = rank, remaining = remaining; "node stopped");

        if remaining == 0 {
            self.server.clear();
        }
    }

    fn stream(&self, key: Key) -> KeyStream {
        self.streams
            .lock()
            .entry(key)
            .or_insert_with(|| KeyStream {
                var: self.engine.new_var(),
                last_round: Arc::new(Mutex::new(None)),
            })
            .clone()
    }

    fn check_array(&self, array: &Array) -> Result<()> {
        if !array.engine().ptr_eq(&self.engine) {
            return Err(KvError::Engine(
                "array was created by another engine".to_string(),
            ));
        }

        let context = array.context();

        if !self.devices.contains(&context) {
            return Err(KvError::UnboundDevice { context });
        }

        Ok(())
    }
}
