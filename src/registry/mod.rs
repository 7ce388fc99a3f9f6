mod entry;
mod registry;

pub use entry::Entry;
pub use registry::ValueRegistry;
