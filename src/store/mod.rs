mod builder;
mod distributed;
mod handle;
mod kvstore;
mod local;
mod node;

pub use builder::StoreBuilder;
pub use distributed::DistributedStore;
pub use kvstore::{KVStore, StoreStatus};
pub use local::LocalStore;
