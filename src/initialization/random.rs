use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};

use super::{ParamGen, Result};

/// Samples every value from a distribution.
pub struct RandParamGen<D: Distribution<f32>> {
    rng: StdRng,
    distribution: D,
}

impl<D: Distribution<f32>> RandParamGen<D> {
    /// Creates a new `RandParamGen`, seeded from the os when `seed` is missing.
    pub fn new(distribution: D, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self { rng, distribution }
    }
}

impl RandParamGen<Uniform<f32>> {
    /// Samples from `[low, high)`.
    ///
    /// # Returns
    /// An error if the range is empty.
    pub fn uniform(low: f32, high: f32, seed: Option<u64>) -> Result<Self> {
        Ok(Self::new(Uniform::new(low, high)?, seed))
    }
}

impl RandParamGen<Normal<f32>> {
    /// Samples from a normal distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is negative or not finite.
    pub fn normal(mean: f32, std_dev: f32, seed: Option<u64>) -> Result<Self> {
        Ok(Self::new(Normal::new(mean, std_dev)?, seed))
    }
}

impl<D: Distribution<f32>> ParamGen for RandParamGen<D> {
    fn fill(&mut self, out: &mut [f32]) {
        for x in out.iter_mut() {
            *x = self.distribution.sample(&mut self.rng);
        }
    }
}
