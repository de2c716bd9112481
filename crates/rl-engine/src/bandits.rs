//! Multi-armed bandit engine: Beta-Bernoulli beliefs per arm and
//! Thompson Sampling for arm selection.

use std::sync::Arc;

use banditlab_core::{LabError, LabResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::random::RandomSource;

/// Shape parameters of a Beta distribution. Used both for an arm's prior and
/// for the conjugate posterior derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaPrior {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaPrior {
    pub const UNIFORM: BetaPrior = BetaPrior {
        alpha: 1.0,
        beta: 1.0,
    };

    pub fn new(alpha: f64, beta: f64) -> LabResult<Self> {
        // `!(x > 0)` also rejects NaN
        if !(alpha > 0.0) || !(beta > 0.0) || !alpha.is_finite() || !beta.is_finite() {
            return Err(LabError::invalid(format!(
                "prior shape parameters must be finite and positive, got ({alpha}, {beta})"
            )));
        }
        Ok(Self { alpha, beta })
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let total = self.alpha + self.beta;
        (self.alpha * self.beta) / (total.powi(2) * (total + 1.0))
    }
}

impl Default for BetaPrior {
    fn default() -> Self {
        Self::UNIFORM
    }
}

/// Belief and counters for a single arm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmState {
    prior: BetaPrior,
    trials: u64,
    successes: u64,
}

impl ArmState {
    fn new(prior: BetaPrior) -> Self {
        Self {
            prior,
            trials: 0,
            successes: 0,
        }
    }

    pub fn prior(&self) -> BetaPrior {
        self.prior
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// Conjugate posterior `Beta(alpha + s, beta + n - s)`.
    pub fn posterior(&self) -> BetaPrior {
        posterior_from_counts(self.prior, self.trials, self.successes)
    }

    pub fn empirical_rate(&self) -> f64 {
        if self.trials > 0 {
            self.successes as f64 / self.trials as f64
        } else {
            0.0
        }
    }
}

pub(crate) fn posterior_from_counts(prior: BetaPrior, trials: u64, successes: u64) -> BetaPrior {
    BetaPrior {
        alpha: prior.alpha + successes as f64,
        beta: prior.beta + (trials - successes) as f64,
    }
}

/// Thompson Sampling over a fixed set of `K` arms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BanditEngine {
    arms: Vec<ArmState>,
}

/// Unchecked wire form of [`BanditEngine`].
#[derive(Deserialize)]
struct EngineSnapshot {
    arms: Vec<ArmSnapshot>,
}

#[derive(Deserialize)]
struct ArmSnapshot {
    prior: BetaPrior,
    trials: u64,
    successes: u64,
}

// Deserialized engines pass the same checks as `BanditEngine::new`.
impl<'de> Deserialize<'de> for BanditEngine {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let snapshot = EngineSnapshot::deserialize(deserializer)?;
        Self::from_snapshot(snapshot).map_err(serde::de::Error::custom)
    }
}

impl BanditEngine {
    fn from_snapshot(snapshot: EngineSnapshot) -> LabResult<Self> {
        let priors = snapshot.arms.iter().map(|a| a.prior).collect();
        let mut engine = Self::new(snapshot.arms.len(), Some(priors))?;

        for (index, (state, arm)) in engine.arms.iter_mut().zip(&snapshot.arms).enumerate() {
            if arm.successes > arm.trials {
                return Err(LabError::invalid(format!(
                    "arm {index} has {} successes but only {} trials",
                    arm.successes, arm.trials
                )));
            }
            state.trials = arm.trials;
            state.successes = arm.successes;
        }
        Ok(engine)
    }
}

impl BanditEngine {
    /// Build an engine with `k` arms. Without `priors` every arm starts from
    /// the uniform `Beta(1, 1)`.
    pub fn new(k: usize, priors: Option<Vec<BetaPrior>>) -> LabResult<Self> {
        if k == 0 {
            return Err(LabError::invalid("bandit needs at least one arm"));
        }

        let priors = match priors {
            Some(priors) => {
                if priors.len() != k {
                    return Err(LabError::invalid(format!(
                        "expected {k} priors, got {}",
                        priors.len()
                    )));
                }
                // Re-validate: fields are public and may bypass BetaPrior::new.
                priors
                    .into_iter()
                    .map(|p| BetaPrior::new(p.alpha, p.beta))
                    .collect::<LabResult<Vec<_>>>()?
            }
            None => vec![BetaPrior::UNIFORM; k],
        };

        Ok(Self {
            arms: priors.into_iter().map(ArmState::new).collect(),
        })
    }

    pub fn num_arms(&self) -> usize {
        self.arms.len()
    }

    pub fn arms(&self) -> &[ArmState] {
        &self.arms
    }

    pub fn arm(&self, index: usize) -> Option<&ArmState> {
        self.arms.get(index)
    }

    pub fn priors(&self) -> Vec<BetaPrior> {
        self.arms.iter().map(|a| a.prior).collect()
    }

    pub fn trials(&self) -> Vec<u64> {
        self.arms.iter().map(|a| a.trials).collect()
    }

    pub fn successes(&self) -> Vec<u64> {
        self.arms.iter().map(|a| a.successes).collect()
    }

    /// Draw one sample from every arm's posterior and return the arm with the
    /// largest draw. Exact ties go to the lowest index.
    pub fn recommend<R: RandomSource + ?Sized>(&self, rng: &mut R) -> LabResult<usize> {
        let mut best_sample = f64::NEG_INFINITY;
        let mut best_arm = 0;

        for (index, arm) in self.arms.iter().enumerate() {
            let posterior = arm.posterior();
            let sample = rng.beta(posterior.alpha, posterior.beta)?;
            if sample > best_sample {
                best_sample = sample;
                best_arm = index;
            }
        }

        Ok(best_arm)
    }

    /// Record one observed outcome for `arm`.
    pub fn update(&mut self, arm: usize, outcome: bool) -> LabResult<()> {
        let k = self.arms.len();
        let state = self
            .arms
            .get_mut(arm)
            .ok_or_else(|| LabError::invalid(format!("arm index {arm} out of range for {k} arms")))?;

        state.trials += 1;
        if outcome {
            state.successes += 1;
        }

        tracing::debug!(
            arm,
            outcome,
            trials = state.trials,
            successes = state.successes,
            "bandit arm updated"
        );
        Ok(())
    }
}

/// Thread-safe handle to one engine. A single lock covers every arm, since
/// `recommend` reads across all of them.
#[derive(Debug, Clone)]
pub struct SharedBanditEngine {
    inner: Arc<Mutex<BanditEngine>>,
}

impl SharedBanditEngine {
    pub fn new(engine: BanditEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn recommend<R: RandomSource + ?Sized>(&self, rng: &mut R) -> LabResult<usize> {
        self.inner.lock().recommend(rng)
    }

    pub fn update(&self, arm: usize, outcome: bool) -> LabResult<()> {
        self.inner.lock().update(arm, outcome)
    }

    pub fn snapshot(&self) -> Vec<ArmState> {
        self.inner.lock().arms.clone()
    }

    pub fn num_arms(&self) -> usize {
        self.inner.lock().num_arms()
    }
}

impl From<BanditEngine> for SharedBanditEngine {
    fn from(engine: BanditEngine) -> Self {
        Self::new(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_priors() {
        for k in 1..6 {
            let engine = BanditEngine::new(k, None).unwrap();
            assert_eq!(engine.num_arms(), k);
            for arm in engine.arms() {
                assert_eq!(arm.trials(), 0);
                assert_eq!(arm.successes(), 0);
                assert_eq!(arm.prior(), BetaPrior::UNIFORM);
            }
        }
    }

    #[test]
    fn test_invalid_construction() {
        assert!(BanditEngine::new(0, None).unwrap_err().is_invalid_argument());
        assert!(BanditEngine::new(2, Some(vec![BetaPrior::UNIFORM]))
            .unwrap_err()
            .is_invalid_argument());
        let bad = vec![
            BetaPrior::UNIFORM,
            BetaPrior {
                alpha: 1.0,
                beta: -2.0,
            },
        ];
        assert!(BanditEngine::new(2, Some(bad)).unwrap_err().is_invalid_argument());
        assert!(BetaPrior::new(f64::NAN, 1.0).is_err());
        assert!(BetaPrior::new(0.0, 1.0).is_err());
    }

    #[test]
    fn test_custom_priors_kept() {
        let priors = vec![BetaPrior::new(2.0, 8.0).unwrap(), BetaPrior::new(5.0, 5.0).unwrap()];
        let engine = BanditEngine::new(2, Some(priors.clone())).unwrap();
        assert_eq!(engine.priors(), priors);
        assert!((engine.arm(0).unwrap().posterior().mean() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_update_counts() {
        let mut engine = BanditEngine::new(2, None).unwrap();
        engine.update(0, true).unwrap();
        engine.update(1, false).unwrap();
        engine.update(0, false).unwrap();

        assert_eq!(engine.arm(0).unwrap().trials(), 2);
        assert_eq!(engine.arm(0).unwrap().successes(), 1);
        assert_eq!(engine.arm(1).unwrap().trials(), 1);
        assert_eq!(engine.arm(1).unwrap().successes(), 0);
        assert_eq!(engine.trials(), vec![2, 1]);
        assert_eq!(engine.successes(), vec![1, 0]);

        let posterior = engine.arm(0).unwrap().posterior();
        assert_eq!(posterior, BetaPrior { alpha: 2.0, beta: 2.0 });
        assert_eq!(engine.arm(0).unwrap().empirical_rate(), 0.5);
    }

    #[test]
    fn test_update_out_of_range_has_no_effect() {
        let mut engine = BanditEngine::new(2, None).unwrap();
        let before = engine.clone();
        assert!(engine.update(2, true).unwrap_err().is_invalid_argument());
        assert_eq!(engine, before);
    }

    #[test]
    fn test_recommend_does_not_mutate() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut engine = BanditEngine::new(3, None).unwrap();
        engine.update(1, true).unwrap();
        let before = engine.clone();

        for _ in 0..500 {
            let arm = engine.recommend(&mut rng).unwrap();
            assert!(arm < 3);
        }
        assert_eq!(engine, before);
    }

    #[test]
    fn test_recommend_is_reproducible() {
        let engine = BanditEngine::new(4, None).unwrap();
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        let picks_a: Vec<_> = (0..50).map(|_| engine.recommend(&mut a).unwrap()).collect();
        let picks_b: Vec<_> = (0..50).map(|_| engine.recommend(&mut b).unwrap()).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_recommend_prefers_strong_arm() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut engine = BanditEngine::new(2, None).unwrap();
        for _ in 0..200 {
            engine.update(0, false).unwrap();
            engine.update(1, true).unwrap();
        }
        let picks = (0..200)
            .filter(|_| engine.recommend(&mut rng).unwrap() == 1)
            .count();
        assert_eq!(picks, 200);
    }

    /// Source whose Beta draws are all identical, forcing an exact tie.
    struct ConstantSource(f64);

    impl RandomSource for ConstantSource {
        fn uniform(&mut self) -> f64 {
            self.0
        }

        fn beta(&mut self, _alpha: f64, _beta: f64) -> LabResult<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_recommend_tie_goes_to_lowest_index() {
        let mut engine = BanditEngine::new(4, None).unwrap();
        engine.update(2, true).unwrap();
        let mut source = ConstantSource(0.5);
        for _ in 0..10 {
            assert_eq!(engine.recommend(&mut source).unwrap(), 0);
        }
    }

    #[test]
    fn test_deserialize_validates_engine() {
        let mut engine = BanditEngine::new(2, Some(vec![BetaPrior::new(2.0, 3.0).unwrap(); 2])).unwrap();
        engine.update(1, true).unwrap();
        engine.update(1, false).unwrap();
        let json = serde_json::to_string(&engine).unwrap();
        let restored: BanditEngine = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, engine);

        let too_many_successes =
            r#"{"arms":[{"prior":{"alpha":1.0,"beta":1.0},"trials":1,"successes":5}]}"#;
        let err = serde_json::from_str::<BanditEngine>(too_many_successes).unwrap_err();
        assert!(err.to_string().contains("successes"), "{err}");

        let bad_prior = r#"{"arms":[{"prior":{"alpha":0.0,"beta":1.0},"trials":0,"successes":0}]}"#;
        assert!(serde_json::from_str::<BanditEngine>(bad_prior).is_err());

        assert!(serde_json::from_str::<BanditEngine>(r#"{"arms":[]}"#).is_err());
    }

    #[test]
    fn test_shared_engine_concurrent_updates() {
        let shared = SharedBanditEngine::new(BanditEngine::new(2, None).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(i);
                    for _ in 0..250 {
                        let arm = shared.recommend(&mut rng).unwrap();
                        shared.update(arm, i % 2 == 0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = shared.snapshot();
        let total: u64 = snapshot.iter().map(|a| a.trials()).sum();
        assert_eq!(total, 1000);
        assert!(snapshot.iter().all(|a| a.successes() <= a.trials()));
    }

    #[test]
    fn test_beta_moments() {
        let prior = BetaPrior::new(2.0, 3.0).unwrap();
        assert!((prior.mean() - 0.4).abs() < 1e-12);
        assert!((prior.variance() - 0.04).abs() < 1e-12);
    }
}
