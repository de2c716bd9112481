//! Random source capability consumed by the bandit and the experiment runner.

use banditlab_core::{LabError, LabResult};
use rand::Rng;
use rand_distr::{Beta, Distribution};

/// Uniform and Beta draws. Injected by the caller so runs can be seeded.
pub trait RandomSource {
    /// A uniform draw in `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// A draw from `Beta(alpha, beta)`; both shapes must be strictly positive.
    fn beta(&mut self, alpha: f64, beta: f64) -> LabResult<f64>;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn uniform(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn beta(&mut self, alpha: f64, beta: f64) -> LabResult<f64> {
        let dist = Beta::new(alpha, beta).map_err(|e| {
            LabError::invalid(format!("Beta({alpha}, {beta}) is not a valid distribution: {e}"))
        })?;
        Ok(dist.sample(self))
    }
}
