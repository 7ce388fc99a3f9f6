mod error;
mod specs;

pub use error::ConfigErr;
pub use specs::{InitSpec, NodeSpec, StoreKind, StoreSpec, UpdaterSpec};
