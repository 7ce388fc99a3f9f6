use log::info;

use super::{DistributedStore, KVStore, LocalStore};
use crate::{
    config::{InitSpec, StoreKind, StoreSpec, UpdaterSpec},
    engine::Engine,
    error::Result,
    initialization::{ConstParamGen, ParamGen, RandParamGen},
    updater::{Adam, Assign, GradientDescent, GradientDescentWithMomentum, Sum, UpdaterFactory},
};

/// Builds ready to use stores from a `StoreSpec`.
#[derive(Debug, Default)]
pub struct StoreBuilder;

impl StoreBuilder {
    /// Creates a new `StoreBuilder`.
    ///
    /// # Returns
    /// A new `StoreBuilder` instance.
    pub fn new() -> Self {
        Self
    }

    /// Builds the engine the stores of `spec` run on.
    ///
    /// # Returns
    /// A new `Engine` with `spec.engine_threads` threads, one per core if unset.
    pub fn build_engine(&self, spec: &StoreSpec) -> Result<Engine> {
        match spec.engine_threads {
            Some(threads) => Engine::new(threads),
            None => Engine::with_default_threads(),
        }
    }

    /// Builds the stores described by `spec`, with their devices bound and
    /// their updater and aggregator set.
    ///
    /// # Arguments
    /// * `engine` - The engine scheduling the stores' operations.
    /// * `spec` - The deployment to build.
    ///
    /// # Returns
    /// One store for the local kind, one per rank (in rank order) for the
    /// distributed kind.
    pub fn build(&self, engine: &Engine, spec: &StoreSpec) -> Result<Vec<Box<dyn KVStore>>> {
        let stores: Vec<Box<dyn KVStore>> = match spec.kind {
            StoreKind::Local => vec![Box::new(LocalStore::new(engine))],
            StoreKind::Distributed { group_size } => DistributedStore::group(engine, group_size)
                .into_iter()
                .map(|store| Box::new(store) as Box<dyn KVStore>)
                .collect(),
        };

        for store in &stores {
            store.set_aggregator(spec.aggregator);
            store.init_devices(&spec.devices)?;
            store.set_updater(self.resolve_updater(spec.updater))?;
        }

        info!(stores = stores.len(), aggregator = spec.aggregator; "stores built");
        Ok(stores)
    }

    /// Resolves the `UpdaterFactory` of a spec.
    pub fn resolve_updater(&self, spec: UpdaterSpec) -> UpdaterFactory {
        match spec {
            UpdaterSpec::Assign => UpdaterFactory::new(|_| Assign),
            UpdaterSpec::Sum => UpdaterFactory::new(|_| Sum),
            UpdaterSpec::GradientDescent { learning_rate } => {
                UpdaterFactory::new(move |_| GradientDescent::new(learning_rate))
            }
            UpdaterSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => UpdaterFactory::new(move |len| {
                GradientDescentWithMomentum::new(len, learning_rate, momentum)
            }),
            UpdaterSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => UpdaterFactory::new(move |len| Adam::new(len, learning_rate, beta1, beta2, epsilon)),
        }
    }

    /// Generates the starting value of a key.
    ///
    /// # Arguments
    /// * `spec` - How to generate the values.
    /// * `len` - The amount of values to generate.
    /// * `seed` - An optional seed for random specs.
    ///
    /// # Returns
    /// The values or an `InvalidConfig` if the distribution is invalid.
    pub fn initial_value(&self, spec: InitSpec, len: usize, seed: Option<u64>) -> Result<Vec<f32>> {
        let mut param_gen: Box<dyn ParamGen> = match spec {
            InitSpec::Const { value } => Box::new(ConstParamGen(value)),
            InitSpec::Uniform { low, high } => Box::new(RandParamGen::uniform(low, high, seed)?),
            InitSpec::Normal { mean, std_dev } => {
                Box::new(RandParamGen::normal(mean, std_dev, seed)?)
            }
        };

        Ok(param_gen.generate(len))
    }
}
