use super::{Updater, updater::check_len};
use crate::error::Result;

/// Gradient descent where each step keeps a fraction of the previous one.
#[derive(Debug)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    steps: Box<[f32]>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` updater.
    ///
    /// # Arguments
    /// * `len` - The length of the key this instance updates.
    /// * `learning_rate` - Scales the received gradient.
    /// * `momentum` - The fraction of the previous step carried into the next.
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            steps: vec![0.; len].into(),
        }
    }
}

impl Updater for GradientDescentWithMomentum {
    fn update(&mut self, recv: &[f32], stored: &mut [f32]) -> Result<()> {
        check_len(recv, stored)?;
        check_len(&self.steps, stored)?;

        for ((x, g), step) in stored.iter_mut().zip(recv).zip(self.steps.iter_mut()) {
            *step = self.momentum * *step - self.learning_rate * g;
            *x += *step;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_build_up() {
        let mut updater = GradientDescentWithMomentum::new(1, 1., 0.5);
        let mut stored = [0.];

        updater.update(&[1.], &mut stored).unwrap();
        assert_eq!(stored, [-1.]);

        updater.update(&[1.], &mut stored).unwrap();
        assert_eq!(stored, [-2.5]);
    }
}
