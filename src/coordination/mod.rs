mod coordinator;
mod identity;

pub use coordinator::Coordinator;
pub use identity::NodeIdentity;
