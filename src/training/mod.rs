mod trainer;

pub use trainer::{PARAMS_KEY, Trainer};
