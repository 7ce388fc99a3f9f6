use std::{
    collections::{HashMap, hash_map},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::RwLock;

use super::Entry;
use crate::{
    Key,
    aggregation::Waiter,
    error::{KvError, Result},
    updater::Updater,
};

/// Maps every initialized key to its `Entry`.
///
/// The map is only written by `init` and `clear`, pushes and pulls just look
/// entries up and work on them through their own locks.
#[derive(Default)]
pub struct ValueRegistry {
    entries: RwLock<HashMap<Key, Arc<Entry>>>,
    sealed: AtomicBool,
}

impl ValueRegistry {
    /// Creates a new empty `ValueRegistry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` with a starting value.
    ///
    /// # Arguments
    /// * `key` - The key to register.
    /// * `shape` - The shape every later push and pull of `key` must have.
    /// * `value` - The starting value.
    /// * `updater` - The updater merging contributions into this key.
    ///
    /// # Returns
    /// The new entry, or `AlreadyInitialized` if `key` was already registered.
    pub fn init(
        &self,
        key: Key,
        shape: &[usize],
        value: Vec<f32>,
        updater: Box<dyn Updater>,
    ) -> Result<Arc<Entry>> {
        let len: usize = shape.iter().product();

        if len != value.len() {
            return Err(KvError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![value.len()],
            });
        }

        let mut entries = self.entries.write();

        match entries.entry(key) {
            hash_map::Entry::Occupied(_) => Err(KvError::AlreadyInitialized),
            hash_map::Entry::Vacant(vacant) => {
                let entry = Arc::new(Entry::new(key, shape, value, updater));
                vacant.insert(Arc::clone(&entry));
                self.sealed.store(true, Ordering::Release);
                Ok(entry)
            }
        }
    }

    /// Looks up the entry of `key`.
    ///
    /// # Returns
    /// The entry or `UnknownKey` if `key` was never initialized.
    pub fn get(&self, key: Key) -> Result<Arc<Entry>> {
        self.entries
            .read()
            .get(&key)
            .cloned()
            .ok_or(KvError::UnknownKey { key })
    }

    /// Overwrites the stored value of `key`.
    pub fn set(&self, key: Key, value: Vec<f32>) -> Result<()> {
        self.get(key)?.set(value)
    }

    /// Snapshot of every registered entry.
    pub fn entries(&self) -> Vec<Arc<Entry>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether any key was initialized since the last `clear`.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Drops every entry, marking them cleared so in-flight operations fail.
    ///
    /// # Returns
    /// The removed entries, paired with the pulls that were waiting on them.
    pub(crate) fn clear(&self) -> Vec<(Arc<Entry>, Vec<Waiter>)> {
        let mut entries = self.entries.write();
        self.sealed.store(false, Ordering::Release);

        entries
            .drain()
            .map(|(_, entry)| {
                let waiters = entry.clear();
                (entry, waiters)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::Assign;

    #[test]
    fn test_init_twice_fails() {
        let registry = ValueRegistry::new();

        registry.init(0, &[1], vec![1.], Box::new(Assign)).unwrap();
        let err = registry.init(0, &[1], vec![2.], Box::new(Assign)).unwrap_err();

        assert_eq!(err, KvError::AlreadyInitialized);
        assert_eq!(registry.get(0).unwrap().get().unwrap(), [1.]);
    }

    #[test]
    fn test_unknown_key() {
        let registry = ValueRegistry::new();

        assert_eq!(registry.get(7).err(), Some(KvError::UnknownKey { key: 7 }));
        assert_eq!(registry.set(7, vec![]), Err(KvError::UnknownKey { key: 7 }));
    }

    #[test]
    fn test_init_checks_value_against_shape() {
        let registry = ValueRegistry::new();
        let err = registry.init(0, &[2, 3], vec![0.; 5], Box::new(Assign)).unwrap_err();

        assert!(matches!(err, KvError::ShapeMismatch { .. }));
        assert!(!registry.is_sealed());
    }

    #[test]
    fn test_clear_unseals_and_aborts_entries() {
        let registry = ValueRegistry::new();
        let entry = registry.init(1, &[1], vec![0.], Box::new(Assign)).unwrap();
        assert!(registry.is_sealed());

        registry.clear();

        assert!(registry.is_empty());
        assert!(!registry.is_sealed());
        assert!(entry.is_cleared());
        assert_eq!(registry.get(1).err(), Some(KvError::UnknownKey { key: 1 }));
    }
}
