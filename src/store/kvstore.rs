use crate::{
    Key,
    array::{Array, Context},
    error::Result,
    updater::UpdaterFactory,
};

/// The lifecycle of a store handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Uninitialized,
    /// Devices are bound but no key holds data yet.
    DevicesBound,
    Ready,
    Stopped,
}

/// A key-value store sharing numeric arrays between the nodes of a group.
///
/// `push` and `pull` return as soon as the operation is scheduled, wait on the
/// arrays to observe their outcome. Operations issued by a handle on the same
/// key run in the order they were issued.
pub trait KVStore: Send + Sync {
    /// Binds the store to `devices` and joins the group.
    ///
    /// # Returns
    /// `AlreadyInitialized` if devices were already bound, or `GroupFull`.
    fn init_devices(&self, devices: &[Context]) -> Result<()>;

    /// Registers `key` with the contents of `value`.
    ///
    /// Blocks until `value` is ready, don't call it from an async context.
    ///
    /// # Returns
    /// `AlreadyInitialized` if `key` was already registered by any node of the group.
    fn init(&self, key: Key, value: &Array) -> Result<()>;

    /// Schedules the contribution of `value` to `key`.
    ///
    /// # Returns
    /// `UnknownKey` if `key` was never initialized. Merge failures are
    /// reported by `value.wait()`.
    fn push(&self, key: Key, value: &Array) -> Result<()>;

    /// Schedules a copy of the value of `key` into `out`.
    ///
    /// The copy observes every push of `key` this handle issued before it.
    ///
    /// # Returns
    /// `UnknownKey` if `key` was never initialized. Failures of the copy are
    /// reported by `out.wait()`.
    fn pull(&self, key: Key, out: &Array) -> Result<()>;

    /// Installs the updater every key initialized afterwards uses.
    ///
    /// # Returns
    /// `UpdaterLocked` once any key was initialized.
    fn set_updater(&self, updater: UpdaterFactory) -> Result<()>;

    /// Switches between merging whole rounds and merging every push.
    fn set_aggregator(&self, enabled: bool);

    fn rank(&self) -> usize;

    fn group_size(&self) -> usize;

    /// Tears the handle down, aborting its pending operations. Idempotent.
    fn stop(&self);

    fn status(&self) -> StoreStatus;

    /// How many times the updater ran for `key`.
    fn merge_count(&self, key: Key) -> Result<u64>;
}
