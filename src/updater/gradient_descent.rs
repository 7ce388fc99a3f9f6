use super::{Updater, updater::check_len};
use crate::error::Result;

/// Treats the received value as a gradient, `stored -= learning_rate * recv`.
#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` updater.
    ///
    /// # Arguments
    /// * `learning_rate` - Scales the received gradient.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Updater for GradientDescent {
    fn update(&mut self, recv: &[f32], stored: &mut [f32]) -> Result<()> {
        check_len(recv, stored)?;

        let lr = self.learning_rate;

        for (p, g) in stored.iter_mut().zip(recv) {
            *p -= lr * g;
        }

        Ok(())
    }
}
