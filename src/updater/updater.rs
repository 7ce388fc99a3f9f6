use std::{fmt, sync::Arc};

use crate::error::{KvError, Result};

/// Merges a received value into the value stored for a key, `stored = merge(recv, stored)`.
pub trait Updater: Send {
    /// Applies a received value to the stored one.
    ///
    /// # Arguments
    /// * `recv` - The pushed value, or the sum of a whole round when aggregating.
    /// * `stored` - The value kept by the store for the key.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `recv` and `stored`.
    fn update(&mut self, recv: &[f32], stored: &mut [f32]) -> Result<()>;
}

/// Builds one `Updater` per key when the key is initialized, given its length.
///
/// Stateful updaters (momentum, adam) keep their state per key this way.
#[derive(Clone)]
pub struct UpdaterFactory(Arc<dyn Fn(usize) -> Box<dyn Updater> + Send + Sync>);

impl fmt::Debug for UpdaterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpdaterFactory")
    }
}

impl Default for UpdaterFactory {
    fn default() -> Self {
        Self::new(|_| Assign)
    }
}

impl UpdaterFactory {
    /// Creates a new `UpdaterFactory`.
    ///
    /// # Arguments
    /// * `factory` - Builds the updater of a key given the key's length.
    pub fn new<U, F>(factory: F) -> Self
    where
        U: Updater + 'static,
        F: Fn(usize) -> U + Send + Sync + 'static,
    {
        Self(Arc::new(move |len| -> Box<dyn Updater> { Box::new(factory(len)) }))
    }

    /// Wraps a plain merge function, shared by every key.
    pub fn from_fn<F>(merge: F) -> Self
    where
        F: Fn(&[f32], &mut [f32]) + Send + Sync + 'static,
    {
        let merge: Arc<dyn Fn(&[f32], &mut [f32]) + Send + Sync> = Arc::new(merge);
        Self::new(move |_| FnUpdater(Arc::clone(&merge)))
    }

    /// Builds the updater for a key of `len` elements.
    pub fn build(&self, len: usize) -> Box<dyn Updater> {
        (self.0)(len)
    }
}

/// The default updater, overwrites the stored value.
#[derive(Debug, Clone, Copy)]
pub struct Assign;

impl Updater for Assign {
    fn update(&mut self, recv: &[f32], stored: &mut [f32]) -> Result<()> {
        check_len(recv, stored)?;
        stored.copy_from_slice(recv);
        Ok(())
    }
}

/// Adds the received value to the stored one.
#[derive(Debug, Clone, Copy)]
pub struct Sum;

impl Updater for Sum {
    fn update(&mut self, recv: &[f32], stored: &mut [f32]) -> Result<()> {
        check_len(recv, stored)?;
        stored.iter_mut().zip(recv).for_each(|(s, r)| *s += r);
        Ok(())
    }
}

/// A user supplied merge function.
pub struct FnUpdater(Arc<dyn Fn(&[f32], &mut [f32]) + Send + Sync>);

impl Updater for FnUpdater {
    fn update(&mut self, recv: &[f32], stored: &mut [f32]) -> Result<()> {
        check_len(recv, stored)?;
        (self.0)(recv, stored);
        Ok(())
    }
}

pub(super) fn check_len(recv: &[f32], stored: &[f32]) -> Result<()> {
    if recv.len() != stored.len() {
        return Err(KvError::length_mismatch(stored.len(), recv.len()));
    }

    Ok(())
}
