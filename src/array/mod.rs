mod array;
mod context;

pub use array::Array;
pub use context::Context;
