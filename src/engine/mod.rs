mod engine;
mod var;

pub use engine::{Completion, Engine};
pub use var::Var;
