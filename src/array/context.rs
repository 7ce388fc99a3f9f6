use std::fmt;

use serde::{Deserialize, Serialize};

/// The device an `Array` is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Context {
    Cpu(usize),
    Gpu(usize),
}

impl Default for Context {
    fn default() -> Self {
        Self::Cpu(0)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Cpu(id) => write!(f, "cpu({id})"),
            Context::Gpu(id) => write!(f, "gpu({id})"),
        }
    }
}
