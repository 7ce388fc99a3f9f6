use std::{error::Error, fmt, io};

/// Failures loading a config file.
#[derive(Debug)]
pub enum ConfigErr {
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::Io(e) => write!(f, "couldn't read config: {e}"),
            ConfigErr::Json(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl Error for ConfigErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigErr::Io(e) => Some(e),
            ConfigErr::Json(e) => Some(e),
        }
    }
}

impl From<io::Error> for ConfigErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<ConfigErr> for io::Error {
    fn from(value: ConfigErr) -> Self {
        match value {
            ConfigErr::Io(e) => e,
            ConfigErr::Json(e) => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
