use super::{Updater, updater::check_len};
use crate::error::Result;

/// Adaptive moment estimation, keeping running averages of the received
/// values and of their squares for every element of the key.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    betas: (f32, f32),
    epsilon: f32,
    step: i32,
    mean: Box<[f32]>,
    variance: Box<[f32]>,
}

impl Adam {
    /// Creates a new `Adam` updater.
    ///
    /// # Arguments
    /// * `len` - The length of the key this instance updates.
    /// * `learning_rate` - Scales every step.
    /// * `beta1` - The decay of the running mean.
    /// * `beta2` - The decay of the running variance.
    /// * `epsilon` - Keeps the step finite when the variance is close to zero.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            betas: (beta1, beta2),
            epsilon,
            step: 0,
            mean: vec![0.; len].into(),
            variance: vec![0.; len].into(),
        }
    }
}

impl Updater for Adam {
    fn update(&mut self, recv: &[f32], stored: &mut [f32]) -> Result<()> {
        check_len(recv, stored)?;
        check_len(&self.mean, stored)?;

        self.step = self.step.saturating_add(1);

        let (b1, b2) = self.betas;
        let mean_correction = 1. - b1.powi(self.step);
        let variance_correction = 1. - b2.powi(self.step);
        let (lr, eps) = (self.learning_rate, self.epsilon);

        for (i, (x, g)) in stored.iter_mut().zip(recv).enumerate() {
            let m = &mut self.mean[i];
            let v = &mut self.variance[i];

            *m = b1 * *m + (1. - b1) * g;
            *v = b2 * *v + (1. - b2) * g * g;

            let m_hat = *m / mean_correction;
            let v_hat = *v / variance_correction;
            *x -= lr * m_hat / (v_hat.sqrt() + eps);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_moves_against_gradient() {
        let mut updater = Adam::new(2, 0.1, 0.9, 0.999, 1e-8);
        let mut stored = [1., 1.];

        updater.update(&[1., -1.], &mut stored).unwrap();

        assert!((stored[0] - 0.9).abs() < 1e-4);
        assert!((stored[1] - 1.1).abs() < 1e-4);
    }

    #[test]
    fn test_rejects_other_lengths() {
        let mut updater = Adam::new(2, 0.1, 0.9, 0.999, 1e-8);
        let mut stored = [0.; 3];

        assert!(updater.update(&[0.; 3], &mut stored).is_err());
    }
}
