use std::{
    error::Error,
    fmt::{self, Display},
};

use rand_distr::{NormalError, uniform::Error as UniformError};

use crate::error::KvError;

/// The result of building a `RandParamGen`.
pub type Result<T> = std::result::Result<T, RandErr>;

/// The distribution parameters of a `RandParamGen` were rejected.
#[derive(Debug)]
pub struct RandErr(String);

impl From<NormalError> for RandErr {
    fn from(value: NormalError) -> Self {
        Self(value.to_string())
    }
}

impl From<UniformError> for RandErr {
    fn from(value: UniformError) -> Self {
        Self(value.to_string())
    }
}

impl From<RandErr> for KvError {
    fn from(value: RandErr) -> Self {
        KvError::InvalidConfig(format!("bad distribution: {}", value.0))
    }
}

impl Display for RandErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for RandErr {}
