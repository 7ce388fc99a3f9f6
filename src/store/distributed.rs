use std::{num::NonZeroUsize, sync::Arc};

use super::handle::{StoreCore, delegate_to_core};
use crate::{engine::Engine, server::Server};

/// A store handle of one node in a group sharing a `Server`.
///
/// A round of a key completes once every node of the group pushed to it.
pub struct DistributedStore {
    core: StoreCore,
}

impl DistributedStore {
    /// Creates a new handle on `server`.
    ///
    /// # Arguments
    /// * `engine` - The engine scheduling the handle's operations.
    /// * `server` - The server shared by the group.
    pub fn new(engine: &Engine, server: Arc<Server>) -> Self {
        Self {
            core: StoreCore::new(engine.clone(), server),
        }
    }

    /// Creates one handle per node of a new group.
    ///
    /// # Arguments
    /// * `engine` - The engine scheduling the handles' operations.
    /// * `group_size` - The amount of nodes in the group.
    pub fn group(engine: &Engine, group_size: NonZeroUsize) -> Vec<Self> {
        let server = Arc::new(Server::new(group_size));

        (0..group_size.get())
            .map(|_| Self::new(engine, Arc::clone(&server)))
            .collect()
    }

    /// Creates another handle on the same server.
    pub fn sibling(&self) -> Self {
        Self {
            core: StoreCore::new(self.core.engine().clone(), Arc::clone(self.core.server())),
        }
    }

    pub fn server(&self) -> &Arc<Server> {
        self.core.server()
    }
}

delegate_to_core!(DistributedStore);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::{Array, Context},
        error::KvError,
        store::{KVStore, StoreStatus},
    };

    fn group(size: usize) -> (Engine, Vec<DistributedStore>) {
        let engine = Engine::new(NonZeroUsize::new(2).unwrap()).unwrap();
        let stores = DistributedStore::group(&engine, NonZeroUsize::new(size).unwrap());
        (engine, stores)
    }

    #[test]
    fn test_ranks_follow_bind_order() {
        let (_, stores) = group(3);

        for store in stores.iter().rev() {
            store.init_devices(&[Context::Cpu(0)]).unwrap();
        }

        let ranks: Vec<_> = stores.iter().map(|store| store.rank()).collect();
        assert_eq!(ranks, [2, 1, 0]);
        assert!(stores.iter().all(|store| store.group_size() == 3));
    }

    #[test]
    fn test_extra_sibling_cannot_join() {
        let (_, stores) = group(1);
        stores[0].init_devices(&[Context::Cpu(0)]).unwrap();

        let extra = stores[0].sibling();
        assert_eq!(
            extra.init_devices(&[Context::Cpu(0)]),
            Err(KvError::GroupFull { group_size: 1 })
        );
    }

    #[test]
    fn test_server_survives_until_last_member_stops() {
        let (engine, stores) = group(2);
        stores[0].init_devices(&[Context::Cpu(0)]).unwrap();
        stores[1].init_devices(&[Context::Cpu(0)]).unwrap();

        let value = Array::zeros(&engine, &[1], Context::Cpu(0));
        stores[0].init(0, &value).unwrap();
        assert_eq!(stores[1].status(), StoreStatus::Ready);

        stores[0].stop();
        assert!(stores[1].server().entry(0).is_ok());

        stores[1].stop();
        assert_eq!(
            stores[1].server().entry(0).err(),
            Some(KvError::UnknownKey { key: 0 })
        );
    }
}
