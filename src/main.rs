use std::{
    env, io,
    sync::{Arc, Barrier},
};

use kvstore::{
    KVStore, StoreBuilder,
    config::NodeSpec,
    training::Trainer,
};
use log::{info, warn};
use tokio::{signal, task::JoinSet};

const DEFAULT_CONFIG: &str = "configs/node.json";

type TrainerSet = JoinSet<(usize, kvstore::Result<Vec<f32>>)>;

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::var("KVSTORE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let spec = NodeSpec::from_json_file(&path)?;
    info!("loaded config from {path}");

    let builder = StoreBuilder::new();
    let engine = builder.build_engine(&spec.store)?;
    let stores: Vec<Arc<dyn KVStore>> = builder
        .build(&engine, &spec.store)?
        .into_iter()
        .map(Arc::from)
        .collect();

    let params = spec.params.get();
    let init = builder.initial_value(spec.init, params, spec.seed)?;
    let device = spec.store.devices.first().copied().unwrap_or_default();
    let barrier = Arc::new(Barrier::new(stores.len()));

    let mut trainers = TrainerSet::new();

    for store in &stores {
        let rank = store.rank();
        let trainer = Trainer::new(
            Arc::clone(store),
            engine.clone(),
            device,
            params,
            spec.epochs,
            spec.target,
            (rank == 0).then(|| init.clone()),
            Arc::clone(&barrier),
        );

        trainers.spawn_blocking(move || (rank, trainer.run()));
    }

    let outcome = tokio::select! {
        ret = join_trainers(&mut trainers) => ret,
        _ = signal::ctrl_c() => {
            info!("interrupted, aborting training");
            Ok(())
        }
    };

    for store in &stores {
        store.stop();
    }

    // Interrupted trainers see their pending operations aborted and return.
    join_trainers(&mut trainers).await?;
    outcome
}

async fn join_trainers(trainers: &mut TrainerSet) -> io::Result<()> {
    while let Some(joined) = trainers.join_next().await {
        match joined.map_err(io::Error::other)? {
            (rank, Ok(params)) if rank == 0 => info!("final params: {params:?}"),
            (_, Ok(_)) => {}
            (rank, Err(e)) => warn!(rank = rank; "trainer stopped: {e}"),
        }
    }

    Ok(())
}
