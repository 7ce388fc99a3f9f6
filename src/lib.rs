mod aggregation;
pub mod array;
pub mod config;
pub mod coordination;
pub mod engine;
pub mod error;
pub mod initialization;
pub mod registry;
pub mod server;
pub mod store;
pub mod training;
pub mod updater;

/// The identifier of a value shared through the store.
pub type Key = i32;

pub use array::{Array, Context};
pub use engine::Engine;
pub use error::{KvError, Result};
pub use store::{DistributedStore, KVStore, LocalStore, StoreBuilder, StoreStatus};
pub use updater::{Updater, UpdaterFactory};
