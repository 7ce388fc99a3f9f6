use std::{mem, sync::Arc};

use log::info;
use parking_lot::RwLock;

use super::{StoreStatus, node::Node};
use crate::{
    Key,
    array::{Array, Context},
    coordination::NodeIdentity,
    engine::Engine,
    error::{KvError, Result},
    server::Server,
    updater::UpdaterFactory,
};

enum State {
    Uninitialized,
    Bound(Arc<Node>),
    Stopped,
}

/// The state machine behind every `KVStore` handle.
pub(super) struct StoreCore {
    engine: Engine,
    server: Arc<Server>,
    state: RwLock<State>,
}

impl StoreCore {
    pub fn new(engine: Engine, server: Arc<Server>) -> Self {
        Self {
            engine,
            server,
            state: RwLock::new(State::Uninitialized),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub fn init_devices(&self, devices: &[Context]) -> Result<()> {
        let mut state = self.state.write();

        if let State::Bound(_) = *state {
            return Err(KvError::AlreadyInitialized);
        }

        if devices.is_empty() {
            return Err(KvError::InvalidConfig("no devices to bind".to_string()));
        }

        let node = Node::join(
            self.engine.clone(),
            Arc::clone(&self.server),
            devices.to_vec(),
        )?;

        *state = State::Bound(Arc::new(node));
        Ok(())
    }

    pub fn init(&self, key: Key, value: &Array) -> Result<()> {
        self.node()?.init(key, value)
    }

    pub fn push(&self, key: Key, value: &Array) -> Result<()> {
        self.node()?.push(key, value)
    }

    pub fn pull(&self, key: Key, out: &Array) -> Result<()> {
        self.node()?.pull(key, out)
    }

    pub fn set_updater(&self, updater: UpdaterFactory) -> Result<()> {
        self.node()?.server().set_updater(updater)
    }

    pub fn set_aggregator(&self, enabled: bool) {
        self.server.set_aggregator(enabled);
    }

    pub fn identity(&self) -> NodeIdentity {
        match &*self.state.read() {
            State::Bound(node) => node.identity(),
            _ => NodeIdentity::default(),
        }
    }

    pub fn status(&self) -> StoreStatus {
        match &*self.state.read() {
            State::Uninitialized => StoreStatus::Uninitialized,
            State::Bound(node) if node.server().registry().is_sealed() => StoreStatus::Ready,
            State::Bound(_) => StoreStatus::DevicesBound,
            State::Stopped => StoreStatus::Stopped,
        }
    }

    pub fn merge_count(&self, key: Key) -> Result<u64> {
        self.node()?.server().merge_count(key)
    }

    /// Moves to `Stopped`. A handle that never bound devices clears the server
    /// only when no other node is using it.
    pub fn stop(&self) {
        let previous = mem::replace(&mut *self.state.write(), State::Stopped);

        match previous {
            State::Bound(node) => node.stop(),
            State::Uninitialized | State::Stopped => {
                if self.server.coordinator().members() == 0 {
                    self.server.clear();
                }
            }
        }

        info!("store stopped");
    }

    fn node(&self) -> Result<Arc<Node>> {
        match &*self.state.read() {
            State::Bound(node) => Ok(Arc::clone(node)),
            _ => Err(KvError::NotInitialized),
        }
    }
}

/// Implements `KVStore` for a type holding a `StoreCore` in its `core` field.
macro_rules! delegate_to_core {
    ($store:ty) => {
        impl $crate::store::KVStore for $store {
            fn init_devices(&self, devices: &[$crate::array::Context]) -> $crate::error::Result<()> {
                self.core.init_devices(devices)
            }

            fn init(&self, key: $crate::Key, value: &$crate::array::Array) -> $crate::error::Result<()> {
                self.core.init(key, value)
            }

            fn push(&self, key: $crate::Key, value: &$crate::array::Array) -> $crate::error::Result<()> {
                self.core.push(key, value)
            }

            fn pull(&self, key: $crate::Key, out: &$crate::array::Array) -> $crate::error::Result<()> {
                self.core.pull(key, out)
            }

            fn set_updater(&self, updater: $crate::updater::UpdaterFactory) -> $crate::error::Result<()> {
                self.core.set_updater(updater)
            }

            fn set_aggregator(&self, enabled: bool) {
                self.core.set_aggregator(enabled)
            }

            fn rank(&self) -> usize {
                self.core.identity().rank()
            }

            fn group_size(&self) -> usize {
                self.core.identity().group_size()
            }

            fn stop(&self) {
                self.core.stop()
            }

            fn status(&self) -> $crate::store::StoreStatus {
                self.core.status()
            }

            fn merge_count(&self, key: $crate::Key) -> $crate::error::Result<u64> {
                self.core.merge_count(key)
            }
        }
    };
}

pub(super) use delegate_to_core;
