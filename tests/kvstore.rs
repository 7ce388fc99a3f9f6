use std::{num::NonZeroUsize, sync::Arc, thread};

use kvstore::{
    Array, Context, DistributedStore, Engine, KVStore, KvError, LocalStore, StoreStatus,
    UpdaterFactory,
    updater::Sum,
};

const CPU: Context = Context::Cpu(0);

fn engine() -> Engine {
    Engine::new(NonZeroUsize::new(4).unwrap()).unwrap()
}

fn array(engine: &Engine, data: &[f32]) -> Array {
    Array::from_vec(engine, &[data.len()], data.to_vec(), CPU).unwrap()
}

fn local(engine: &Engine) -> LocalStore {
    let store = LocalStore::new(engine);
    store.init_devices(&[CPU]).unwrap();
    store
}

fn group(engine: &Engine, size: usize) -> Vec<DistributedStore> {
    let stores = DistributedStore::group(engine, NonZeroUsize::new(size).unwrap());

    for store in &stores {
        store.init_devices(&[CPU]).unwrap();
    }

    stores
}

fn sum() -> UpdaterFactory {
    UpdaterFactory::new(|_| Sum)
}

#[test]
fn test_pull_before_push_returns_initial_value() {
    let engine = engine();
    let store = local(&engine);

    store.init(3, &array(&engine, &[1., 2., 3.])).unwrap();

    let out = Array::zeros(&engine, &[3], CPU);
    store.pull(3, &out).unwrap();

    assert_eq!(out.to_vec().unwrap(), [1., 2., 3.]);
    assert_eq!(store.merge_count(3), Ok(0));
}

#[test]
fn test_two_workers_aggregate_into_one_merge() {
    let engine = engine();
    let stores = group(&engine, 2);
    stores[0].set_updater(sum()).unwrap();

    stores[0].init(0, &array(&engine, &[0., 0.])).unwrap();
    stores[0].push(0, &array(&engine, &[1., 2.])).unwrap();
    stores[1].push(0, &array(&engine, &[3., 4.])).unwrap();

    let out = Array::zeros(&engine, &[2], CPU);
    stores[0].pull(0, &out).unwrap();

    assert_eq!(out.to_vec().unwrap(), [4., 6.]);
    assert_eq!(stores[1].merge_count(0), Ok(1));
}

#[test]
fn test_full_round_fires_updater_once() {
    const N: usize = 4;

    let engine = engine();
    let stores = group(&engine, N);
    stores[0].set_updater(sum()).unwrap();
    stores[0].init(0, &array(&engine, &[1.])).unwrap();

    for (rank, store) in stores.iter().enumerate() {
        store.push(0, &array(&engine, &[rank as f32])).unwrap();
    }

    let out = Array::zeros(&engine, &[1], CPU);
    stores[N - 1].pull(0, &out).unwrap();

    assert_eq!(out.to_vec().unwrap(), [1. + 0. + 1. + 2. + 3.]);
    assert_eq!(stores[0].merge_count(0), Ok(1));
}

#[test]
fn test_online_mode_merges_every_push_in_order() {
    let engine = engine();
    let store = local(&engine);
    store.set_aggregator(false);
    store.set_updater(sum()).unwrap();

    store.init(1, &array(&engine, &[10.])).unwrap();
    store.push(1, &array(&engine, &[1.])).unwrap();
    store.push(1, &array(&engine, &[2.])).unwrap();

    let out = Array::zeros(&engine, &[1], CPU);
    store.pull(1, &out).unwrap();

    assert_eq!(out.to_vec().unwrap(), [13.]);
    assert_eq!(store.merge_count(1), Ok(2));
}

#[test]
fn test_online_merges_follow_enqueue_order() {
    let engine = engine();
    let stores = group(&engine, 3);
    stores[0].set_aggregator(false);
    stores[0]
        .set_updater(UpdaterFactory::from_fn(|recv, stored| {
            stored[0] = stored[0] * 10. + recv[0];
        }))
        .unwrap();

    stores[0].init(0, &array(&engine, &[0.])).unwrap();

    for digit in 1..=4 {
        stores[0].push(0, &array(&engine, &[digit as f32])).unwrap();
    }

    let out = Array::zeros(&engine, &[1], CPU);
    stores[0].pull(0, &out).unwrap();

    assert_eq!(out.to_vec().unwrap(), [1234.]);
    assert_eq!(stores[0].merge_count(0), Ok(4));
}

#[test]
fn test_unknown_key() {
    let engine = engine();
    let store = local(&engine);
    let value = array(&engine, &[1.]);

    assert_eq!(store.push(5, &value), Err(KvError::UnknownKey { key: 5 }));
    assert_eq!(store.pull(5, &value), Err(KvError::UnknownKey { key: 5 }));
    assert_eq!(store.merge_count(5), Err(KvError::UnknownKey { key: 5 }));
}

#[test]
fn test_init_twice_fails_across_ranks() {
    let engine = engine();
    let stores = group(&engine, 2);

    stores[0].init(0, &array(&engine, &[1.])).unwrap();

    assert_eq!(
        stores[0].init(0, &array(&engine, &[2.])),
        Err(KvError::AlreadyInitialized)
    );
    assert_eq!(
        stores[1].init(0, &array(&engine, &[2.])),
        Err(KvError::AlreadyInitialized)
    );
}

#[test]
fn test_updater_locked_after_init() {
    let engine = engine();
    let store = local(&engine);

    store.set_updater(sum()).unwrap();
    store.init(0, &array(&engine, &[1.])).unwrap();

    assert_eq!(store.set_updater(sum()), Err(KvError::UpdaterLocked));

    store.push(0, &array(&engine, &[2.])).unwrap();
    let out = Array::zeros(&engine, &[1], CPU);
    store.pull(0, &out).unwrap();

    assert_eq!(out.to_vec().unwrap(), [3.]);
}

#[test]
fn test_stop_resets_store() {
    let engine = engine();
    let stores = group(&engine, 2);
    stores[0].set_aggregator(false);
    stores[0].set_updater(sum()).unwrap();
    stores[0].init(0, &array(&engine, &[1.])).unwrap();

    for store in &stores {
        store.stop();
        assert_eq!(store.status(), StoreStatus::Stopped);
        assert_eq!((store.rank(), store.group_size()), (0, 1));
    }

    for store in &stores {
        store.init_devices(&[CPU]).unwrap();
    }

    let value = array(&engine, &[1.]);
    assert_eq!(stores[1].pull(0, &value), Err(KvError::UnknownKey { key: 0 }));

    // Two pushes fill a round of two and their sum is assigned: the aggregator
    // and the updater are back to their defaults.
    stores[0].init(0, &array(&engine, &[5.])).unwrap();
    let (a, b) = (array(&engine, &[7.]), array(&engine, &[7.]));
    stores[0].push(0, &a).unwrap();
    stores[0].push(0, &b).unwrap();
    a.wait().unwrap();
    b.wait().unwrap();

    let out = Array::zeros(&engine, &[1], CPU);
    stores[1].pull(0, &out).unwrap();

    assert_eq!(out.to_vec().unwrap(), [14.]);
    assert_eq!(stores[1].merge_count(0), Ok(1));
}

#[test]
fn test_stop_aborts_parked_pull() {
    let engine = engine();
    let stores = group(&engine, 2);
    stores[0].init(9, &array(&engine, &[0.])).unwrap();

    stores[0].push(9, &array(&engine, &[1.])).unwrap();
    let out = Array::zeros(&engine, &[1], CPU);
    stores[0].pull(9, &out).unwrap();

    stores[0].stop();

    assert_eq!(out.wait(), Err(KvError::Aborted { key: 9 }));
}

#[test]
fn test_merge_failure_aborts_round() {
    let engine = engine();
    let stores = group(&engine, 2);
    stores[0].set_updater(sum()).unwrap();
    stores[0].init(0, &array(&engine, &[1., 1.])).unwrap();

    let good = array(&engine, &[5., 5.]);
    stores[0].push(0, &good).unwrap();
    good.wait().unwrap();

    let out = Array::zeros(&engine, &[2], CPU);
    stores[0].pull(0, &out).unwrap();

    let bad = array(&engine, &[1., 2., 3.]);
    stores[1].push(0, &bad).unwrap();

    let expected = KvError::ShapeMismatch {
        expected: vec![2],
        got: vec![3],
    };

    assert_eq!(bad.wait(), Err(expected.clone()));
    assert_eq!(out.wait(), Err(expected));

    stores[0].pull(0, &out).unwrap();
    assert_eq!(out.to_vec().unwrap(), [1., 1.]);
    assert_eq!(stores[0].merge_count(0), Ok(0));
}

#[test]
fn test_online_push_keeps_pending_round() {
    let engine = engine();
    let stores = group(&engine, 2);
    stores[0].set_updater(sum()).unwrap();
    stores[0].init(0, &array(&engine, &[0.])).unwrap();

    let buffered = array(&engine, &[1.]);
    stores[0].push(0, &buffered).unwrap();
    buffered.wait().unwrap();

    stores[0].set_aggregator(false);
    let online = array(&engine, &[10.]);
    stores[0].push(0, &online).unwrap();
    online.wait().unwrap();
    stores[0].set_aggregator(true);

    // Still parked on the round holding the first push.
    let out = Array::zeros(&engine, &[1], CPU);
    stores[0].pull(0, &out).unwrap();
    stores[1].push(0, &array(&engine, &[100.])).unwrap();

    assert_eq!(out.to_vec().unwrap(), [111.]);
    assert_eq!(stores[0].merge_count(0), Ok(2));
}

#[test]
fn test_pull_into_wrong_shape_fails_on_wait() {
    let engine = engine();
    let store = local(&engine);
    store.init(0, &array(&engine, &[1., 1.])).unwrap();

    let out = Array::zeros(&engine, &[3], CPU);
    store.pull(0, &out).unwrap();

    assert_eq!(
        out.wait(),
        Err(KvError::ShapeMismatch {
            expected: vec![2],
            got: vec![3],
        })
    );
}

#[test]
fn test_unbound_device_is_rejected() {
    let engine = engine();
    let store = local(&engine);
    store.init(0, &array(&engine, &[0.])).unwrap();

    let gpu = Array::zeros(&engine, &[1], Context::Gpu(0));

    assert_eq!(
        store.push(0, &gpu),
        Err(KvError::UnboundDevice {
            context: Context::Gpu(0)
        })
    );
}

#[test]
fn test_concurrent_workers_stay_in_lockstep() {
    const RANKS: usize = 4;
    const EPOCHS: usize = 20;

    let engine = engine();
    let stores = group(&engine, RANKS);
    stores[0].set_updater(sum()).unwrap();
    stores[0].init(0, &array(&engine, &[0.])).unwrap();

    let handles: Vec<_> = stores
        .into_iter()
        .map(|store| {
            let engine = engine.clone();
            let store: Arc<dyn KVStore> = Arc::new(store);

            thread::spawn(move || {
                let out = Array::zeros(&engine, &[1], CPU);
                let mut seen = Vec::with_capacity(EPOCHS);

                for _ in 0..EPOCHS {
                    store.push(0, &array(&engine, &[1.])).unwrap();
                    store.pull(0, &out).unwrap();
                    seen.push(out.to_vec().unwrap()[0]);
                }

                (store, seen)
            })
        })
        .collect();

    let expected: Vec<_> = (1..=EPOCHS).map(|epoch| (epoch * RANKS) as f32).collect();

    for handle in handles {
        let (store, seen) = handle.join().unwrap();
        assert_eq!(seen, expected);
        assert_eq!(store.merge_count(0), Ok(EPOCHS as u64));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_async_wait_on_pull() {
    let engine = engine();
    let stores = Arc::new(group(&engine, 2));
    stores[0].set_updater(sum()).unwrap();

    // `init` and `to_vec` block, keep them off the runtime's workers.
    let (init_stores, value) = (Arc::clone(&stores), array(&engine, &[2.]));
    tokio::task::spawn_blocking(move || init_stores[0].init(0, &value))
        .await
        .unwrap()
        .unwrap();

    let out = Array::zeros(&engine, &[1], CPU);
    stores[0].push(0, &array(&engine, &[1.])).unwrap();
    stores[0].pull(0, &out).unwrap();
    stores[1].push(0, &array(&engine, &[1.])).unwrap();

    out.wait_async().await.unwrap();

    let params = tokio::task::spawn_blocking(move || out.to_vec())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(params, [4.]);
}
