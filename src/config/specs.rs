use std::{fs, num::NonZeroUsize, path::Path};

use serde::{Deserialize, Serialize};

use super::ConfigErr;
use crate::array::Context;

/// Which store variant to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Local,
    /// One handle per node, all of them sharing a server.
    Distributed { group_size: NonZeroUsize },
}

/// The merge function installed on the store.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdaterSpec {
    #[default]
    Assign,
    Sum,
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
}

/// How the starting values of a key are generated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitSpec {
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
}

/// The specification of a store deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSpec {
    pub kind: StoreKind,
    #[serde(default = "default_devices")]
    pub devices: Vec<Context>,
    #[serde(default = "default_aggregator")]
    pub aggregator: bool,
    #[serde(default)]
    pub updater: UpdaterSpec,
    #[serde(default)]
    pub engine_threads: Option<NonZeroUsize>,
}

impl StoreSpec {
    /// Loads a `StoreSpec` from a json file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigErr> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// The specification of the node binary: a store plus the synthetic training
/// run driven through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub store: StoreSpec,
    pub params: NonZeroUsize,
    pub epochs: usize,
    pub init: InitSpec,
    /// Every parameter is trained towards this value.
    pub target: f32,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl NodeSpec {
    /// Loads a `NodeSpec` from a json file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigErr> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn default_devices() -> Vec<Context> {
    vec![Context::default()]
}

fn default_aggregator() -> bool {
    true
}
