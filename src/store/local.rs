use std::{num::NonZeroUsize, sync::Arc};

use super::handle::{StoreCore, delegate_to_core};
use crate::{engine::Engine, server::Server};

/// A store used by a single node, every push completes a round on its own.
pub struct LocalStore {
    core: StoreCore,
}

impl LocalStore {
    /// Creates a new `LocalStore`.
    ///
    /// # Arguments
    /// * `engine` - The engine scheduling the store's operations.
    pub fn new(engine: &Engine) -> Self {
        let server = Arc::new(Server::new(NonZeroUsize::MIN));

        Self {
            core: StoreCore::new(engine.clone(), server),
        }
    }
}

delegate_to_core!(LocalStore);
