use std::sync::{Arc, Barrier};

use log::debug;

use crate::{
    Key,
    array::{Array, Context},
    engine::Engine,
    error::Result,
    store::KVStore,
};

/// The key every trainer of a run pushes to and pulls from.
pub const PARAMS_KEY: Key = 0;

/// Trains a parameter vector towards a constant target through a store.
///
/// Each rank computes the least squares gradient `(params - target)`, scaled
/// down by the group size so the sum of a round is the full gradient, and
/// pushes it. The updater installed on the store turns it into a step.
pub struct Trainer {
    store: Arc<dyn KVStore>,
    engine: Engine,
    device: Context,
    params: usize,
    epochs: usize,
    target: f32,
    init: Option<Vec<f32>>,
    barrier: Arc<Barrier>,
}

impl Trainer {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `store` - The store handle of this rank, with its devices bound.
    /// * `engine` - The engine `store` runs on.
    /// * `device` - Where the trainer's arrays are placed.
    /// * `epochs` - The amount of push / pull rounds.
    /// * `target` - The value every parameter should converge to.
    /// * `init` - The starting parameters, only the rank registering the key has them.
    /// * `barrier` - Shared by every rank, keeps them from pulling before the key exists.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn KVStore>,
        engine: Engine,
        device: Context,
        params: usize,
        epochs: usize,
        target: f32,
        init: Option<Vec<f32>>,
        barrier: Arc<Barrier>,
    ) -> Self {
        Self {
            store,
            engine,
            device,
            params,
            epochs,
            target,
            init,
            barrier,
        }
    }

    /// Runs every epoch, blocking the calling thread.
    ///
    /// # Returns
    /// The parameters after the last epoch.
    pub fn run(self) -> Result<Vec<f32>> {
        let shape = [self.params];
        let rank = self.store.rank();

        let registered = match self.init {
            Some(init) => Array::from_vec(&self.engine, &shape, init, self.device)
                .and_then(|value| self.store.init(PARAMS_KEY, &value)),
            None => Ok(()),
        };

        self.barrier.wait();
        registered?;

        let params = Array::zeros(&self.engine, &shape, self.device);
        let group_size = self.store.group_size() as f32;

        for epoch in 0..self.epochs {
            self.store.pull(PARAMS_KEY, &params)?;
            let current = params.to_vec()?;

            let loss = current.iter().map(|p| 0.5 * (p - self.target).powi(2)).sum::<f32>()
                / self.params as f32;

            let grad = current.iter().map(|p| (p - self.target) / group_size).collect();
            let grad = Array::from_vec(&self.engine, &shape, grad, self.device)?;

            self.store.push(PARAMS_KEY, &grad)?;
            grad.wait()?;

            debug!(rank = rank, epoch = epoch, loss = loss; "epoch finished");
        }

        self.store.pull(PARAMS_KEY, &params)?;
        params.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::{
        store::{DistributedStore, LocalStore},
        updater::{GradientDescent, UpdaterFactory},
    };

    fn engine() -> Engine {
        Engine::new(NonZeroUsize::new(4).unwrap()).unwrap()
    }

    #[test]
    fn test_local_training_converges() {
        let engine = engine();
        let store = LocalStore::new(&engine);
        store.init_devices(&[Context::Cpu(0)]).unwrap();
        store
            .set_updater(UpdaterFactory::new(|_| GradientDescent::new(0.5)))
            .unwrap();

        let trainer = Trainer::new(
            Arc::new(store),
            engine,
            Context::Cpu(0),
            4,
            30,
            3.,
            Some(vec![0.; 4]),
            Arc::new(Barrier::new(1)),
        );

        let params = trainer.run().unwrap();
        assert!(params.iter().all(|p| (p - 3.).abs() < 1e-3));
    }

    #[test]
    fn test_distributed_training_converges() {
        let engine = engine();
        let group_size = NonZeroUsize::new(3).unwrap();
        let barrier = Arc::new(Barrier::new(group_size.get()));

        let stores = DistributedStore::group(&engine, group_size);
        for store in &stores {
            store.init_devices(&[Context::Cpu(0)]).unwrap();
        }
        stores[0]
            .set_updater(UpdaterFactory::new(|_| GradientDescent::new(0.5)))
            .unwrap();

        let handles: Vec<_> = stores
            .into_iter()
            .enumerate()
            .map(|(rank, store)| {
                let init = (rank == 0).then(|| vec![-2.; 2]);
                let trainer = Trainer::new(
                    Arc::new(store),
                    engine.clone(),
                    Context::Cpu(0),
                    2,
                    30,
                    1.,
                    init,
                    Arc::clone(&barrier),
                );

                std::thread::spawn(move || trainer.run())
            })
            .collect();

        for handle in handles {
            let params = handle.join().unwrap().unwrap();
            assert!(params.iter().all(|p| (p - 1.).abs() < 1e-3));
        }
    }
}
