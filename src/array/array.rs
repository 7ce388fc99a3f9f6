use std::{fmt, sync::Arc};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;

use crate::{
    array::Context,
    engine::{Engine, Var},
    error::{KvError, Result},
};

/// Element-wise kernels split the buffers in chunks of this size.
const CHUNK_SIZE: usize = 1 << 14;

struct ArrayInner {
    engine: Engine,
    var: Var,
    shape: Box<[usize]>,
    context: Context,
    data: RwLock<Box<[f32]>>,
    error: Mutex<Option<KvError>>,
}

/// A reference counted numeric buffer placed on a device.
///
/// Every mutation goes through the engine, so methods return right after
/// scheduling. Call `wait` before reading the contents.
#[derive(Clone)]
pub struct Array(Arc<ArrayInner>);

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("var", &self.0.var)
            .field("shape", &self.0.shape)
            .field("context", &self.0.context)
            .finish()
    }
}

impl Array {
    /// Creates a new zero filled `Array`.
    ///
    /// # Arguments
    /// * `engine` - The engine scheduling operations on this array.
    /// * `shape` - The dimensions of the array.
    /// * `context` - The device the array lives on.
    pub fn zeros(engine: &Engine, shape: &[usize], context: Context) -> Self {
        let len = shape.iter().product();
        Self::new(engine, shape, vec![0.; len], context)
    }

    /// Creates a new `Array` holding `data`.
    ///
    /// # Returns
    /// A `ShapeMismatch` if `data` doesn't have as many elements as `shape` describes.
    pub fn from_vec(
        engine: &Engine,
        shape: &[usize],
        data: Vec<f32>,
        context: Context,
    ) -> Result<Self> {
        let len: usize = shape.iter().product();

        if len != data.len() {
            return Err(KvError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }

        Ok(Self::new(engine, shape, data, context))
    }

    fn new(engine: &Engine, shape: &[usize], data: Vec<f32>, context: Context) -> Self {
        Self(Arc::new(ArrayInner {
            engine: engine.clone(),
            var: engine.new_var(),
            shape: shape.into(),
            context,
            data: RwLock::new(data.into_boxed_slice()),
            error: Mutex::new(None),
        }))
    }

    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    pub fn len(&self) -> usize {
        self.0.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn context(&self) -> Context {
        self.0.context
    }

    /// Whether both handles point to the same buffer.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Blocks until every operation scheduled on this array so far has completed.
    ///
    /// # Returns
    /// The first error recorded by those operations, it's cleared once reported.
    ///
    /// # Panics
    /// If called from within an async runtime, use `wait_async` there.
    pub fn wait(&self) -> Result<()> {
        self.0.engine.wait_for_var(&self.0.var);
        self.take_error()
    }

    /// Async version of `wait`.
    pub async fn wait_async(&self) -> Result<()> {
        self.0.engine.wait_for_var_async(&self.0.var).await;
        self.take_error()
    }

    /// Waits on the array and copies its contents out.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        self.wait()?;
        Ok(self.0.data.read().to_vec())
    }

    /// Schedules a copy of `src` into this array, regardless of their devices.
    ///
    /// A length mismatch is reported when waiting on this array.
    pub fn copy_from(&self, src: &Array) {
        if self.ptr_eq(src) {
            return;
        }

        let (dst, src) = (self.clone(), src.clone());
        self.0.engine.push(&[src.var().clone()], &[dst.var().clone()], move || {
            let src_data = src.data();

            if src_data.len() != dst.len() {
                dst.fail(KvError::ShapeMismatch {
                    expected: dst.shape().to_vec(),
                    got: src.shape().to_vec(),
                });
                return;
            }

            copy(&mut dst.data_mut(), &src_data);
        });
    }

    /// Schedules the element-wise addition of `src` into this array.
    ///
    /// A length mismatch is reported when waiting on this array.
    pub fn add_assign(&self, src: &Array) {
        let (dst, src) = (self.clone(), src.clone());

        if dst.ptr_eq(&src) {
            self.0.engine.push(&[], &[dst.var().clone()], move || {
                dst.data_mut().par_iter_mut().for_each(|x| *x *= 2.);
            });
            return;
        }

        self.0.engine.push(&[src.var().clone()], &[dst.var().clone()], move || {
            let src_data = src.data();

            if src_data.len() != dst.len() {
                dst.fail(KvError::ShapeMismatch {
                    expected: dst.shape().to_vec(),
                    got: src.shape().to_vec(),
                });
                return;
            }

            accumulate(&mut dst.data_mut(), &src_data);
        });
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.0.engine
    }

    pub(crate) fn var(&self) -> &Var {
        &self.0.var
    }

    /// Only sound inside an engine operation that declared this array's var.
    pub(crate) fn data(&self) -> RwLockReadGuard<'_, Box<[f32]>> {
        self.0.data.read()
    }

    /// Only sound inside an engine operation that declared this array's var as written.
    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, Box<[f32]>> {
        self.0.data.write()
    }

    /// Records a deferred failure, the first one wins.
    pub(crate) fn fail(&self, err: KvError) {
        self.0.error.lock().get_or_insert(err);
    }

    fn take_error(&self) -> Result<()> {
        match self.0.error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Adds `src` into `dst` element-wise, both must have the same length.
fn accumulate(dst: &mut [f32], src: &[f32]) {
    dst.par_chunks_mut(CHUNK_SIZE)
        .zip(src.par_chunks(CHUNK_SIZE))
        .for_each(|(acc, chunk)| acc.iter_mut().zip(chunk).for_each(|(a, x)| *a += x));
}

/// Copies `src` into `dst`, both must have the same length.
fn copy(dst: &mut [f32], src: &[f32]) {
    dst.par_chunks_mut(CHUNK_SIZE)
        .zip(src.par_chunks(CHUNK_SIZE))
        .for_each(|(out, chunk)| out.copy_from_slice(chunk));
}
