//! Experiment runner: drives a bandit against known per-arm success rates and
//! keeps the full per-round trajectory for downstream analysis.

use banditlab_core::{LabError, LabResult};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bandits::{posterior_from_counts, BanditEngine, BetaPrior};
use crate::random::RandomSource;

/// State of the experiment after one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: usize,
    pub arm: usize,
    pub outcome: bool,
    /// Cumulative trials per arm, after this round's update.
    pub trials: Vec<u64>,
    /// Cumulative successes per arm, after this round's update.
    pub successes: Vec<u64>,
}

/// Built only by [`ExperimentRunner::run`], so its rows and per-arm vectors
/// always agree in length.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentHistory {
    pub run_id: Uuid,
    pub ground_truth: Vec<f64>,
    pub priors: Vec<BetaPrior>,
    pub rounds: Vec<RoundRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmSummary {
    pub arm: usize,
    pub true_rate: f64,
    pub trials: u64,
    pub successes: u64,
    pub empirical_rate: f64,
    pub posterior_mean: f64,
    pub traffic_share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub run_id: Uuid,
    pub rounds: usize,
    pub total_successes: u64,
    pub overall_rate: f64,
    pub best_arm: usize,
    pub most_played_arm: usize,
    pub cumulative_regret: f64,
    pub arms: Vec<ArmSummary>,
}

impl ExperimentHistory {
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn num_arms(&self) -> usize {
        self.ground_truth.len()
    }

    pub fn final_round(&self) -> Option<&RoundRecord> {
        self.rounds.last()
    }

    /// Overall success rate at each round: total successes so far over rounds played.
    pub fn empirical_ctr(&self) -> Vec<f64> {
        let mut total = 0u64;
        self.rounds
            .iter()
            .enumerate()
            .map(|(t, record)| {
                if record.outcome {
                    total += 1;
                }
                total as f64 / (t + 1) as f64
            })
            .collect()
    }

    /// Expected regret accumulated up to each round, measured against the
    /// best true rate.
    pub fn cumulative_regret(&self) -> Vec<f64> {
        let best = best_rate(&self.ground_truth);
        let mut regret = 0.0;
        self.rounds
            .iter()
            .map(|record| {
                regret += best - self.ground_truth[record.arm];
                regret
            })
            .collect()
    }

    /// Per-arm Beta posterior as it stood after `round`.
    pub fn posteriors_at(&self, round: usize) -> LabResult<Vec<BetaPrior>> {
        let record = self.rounds.get(round).ok_or_else(|| {
            LabError::invalid(format!(
                "round {round} out of range for history of {} rounds",
                self.rounds.len()
            ))
        })?;

        Ok(self
            .priors
            .iter()
            .zip(record.trials.iter().zip(&record.successes))
            .map(|(prior, (&trials, &successes))| posterior_from_counts(*prior, trials, successes))
            .collect())
    }

    /// `T x K` matrix of cumulative trials.
    pub fn trials_matrix(&self) -> Array2<u64> {
        self.matrix(|record| &record.trials)
    }

    /// `T x K` matrix of cumulative successes.
    pub fn successes_matrix(&self) -> Array2<u64> {
        self.matrix(|record| &record.successes)
    }

    fn matrix<'a>(&'a self, column: impl Fn(&'a RoundRecord) -> &'a Vec<u64>) -> Array2<u64> {
        let k = self.num_arms();
        let mut out = Array2::zeros((self.rounds.len(), k));
        for (t, record) in self.rounds.iter().enumerate() {
            for (i, value) in column(record).iter().enumerate() {
                out[[t, i]] = *value;
            }
        }
        out
    }

    pub fn summary(&self) -> ExperimentSummary {
        let k = self.num_arms();
        let (trials, successes) = match self.final_round() {
            Some(last) => (last.trials.clone(), last.successes.clone()),
            None => (vec![0; k], vec![0; k]),
        };
        let total_trials: u64 = trials.iter().sum();
        let total_successes: u64 = successes.iter().sum();

        let arms: Vec<ArmSummary> = (0..k)
            .map(|i| {
                let posterior = posterior_from_counts(self.priors[i], trials[i], successes[i]);
                ArmSummary {
                    arm: i,
                    true_rate: self.ground_truth[i],
                    trials: trials[i],
                    successes: successes[i],
                    empirical_rate: if trials[i] > 0 {
                        successes[i] as f64 / trials[i] as f64
                    } else {
                        0.0
                    },
                    posterior_mean: posterior.mean(),
                    traffic_share: if total_trials > 0 {
                        trials[i] as f64 / total_trials as f64
                    } else {
                        1.0 / k as f64
                    },
                }
            })
            .collect();

        ExperimentSummary {
            run_id: self.run_id,
            rounds: self.rounds.len(),
            total_successes,
            overall_rate: if total_trials > 0 {
                total_successes as f64 / total_trials as f64
            } else {
                0.0
            },
            best_arm: argmax_first(&self.ground_truth),
            most_played_arm: argmax_first(&trials.iter().map(|&n| n as f64).collect::<Vec<_>>()),
            cumulative_regret: self.cumulative_regret().last().copied().unwrap_or(0.0),
            arms,
        }
    }
}

fn best_rate(rates: &[f64]) -> f64 {
    rates.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn argmax_first(values: &[f64]) -> usize {
    let mut best = f64::NEG_INFINITY;
    let mut best_index = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            best_index = i;
        }
    }
    best_index
}

/// Runs a fixed number of rounds against ground-truth success rates.
#[derive(Debug, Clone)]
pub struct ExperimentRunner {
    rounds: usize,
    ground_truth: Vec<f64>,
}

impl ExperimentRunner {
    pub fn new(rounds: usize, ground_truth: Vec<f64>) -> LabResult<Self> {
        if rounds == 0 {
            return Err(LabError::invalid("experiment needs at least one round"));
        }
        if ground_truth.is_empty() {
            return Err(LabError::invalid("ground truth needs at least one arm"));
        }
        if let Some((arm, rate)) = ground_truth
            .iter()
            .enumerate()
            .find(|(_, r)| !(0.0..=1.0).contains(*r))
        {
            return Err(LabError::invalid(format!(
                "ground-truth rate for arm {arm} must be within [0, 1], got {rate}"
            )));
        }
        Ok(Self {
            rounds,
            ground_truth,
        })
    }

    /// Runner whose `k` true rates are drawn uniformly from the random source.
    pub fn with_random_rates<R: RandomSource + ?Sized>(
        rounds: usize,
        k: usize,
        rng: &mut R,
    ) -> LabResult<Self> {
        let ground_truth = (0..k).map(|_| rng.uniform()).collect();
        Self::new(rounds, ground_truth)
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn ground_truth(&self) -> &[f64] {
        &self.ground_truth
    }

    /// Play every round: recommend, simulate a Bernoulli reward, update, record.
    pub fn run<R: RandomSource + ?Sized>(
        &self,
        engine: &mut BanditEngine,
        rng: &mut R,
    ) -> LabResult<ExperimentHistory> {
        if engine.num_arms() != self.ground_truth.len() {
            return Err(LabError::invalid(format!(
                "engine has {} arms but ground truth has {} rates",
                engine.num_arms(),
                self.ground_truth.len()
            )));
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            run_id = %run_id,
            rounds = self.rounds,
            arms = engine.num_arms(),
            "experiment started"
        );

        let mut rounds = Vec::with_capacity(self.rounds);
        for round in 0..self.rounds {
            let arm = engine.recommend(rng)?;
            let outcome = rng.uniform() < self.ground_truth[arm];
            engine.update(arm, outcome)?;
            rounds.push(RoundRecord {
                round,
                arm,
                outcome,
                trials: engine.trials(),
                successes: engine.successes(),
            });
        }

        let history = ExperimentHistory {
            run_id,
            ground_truth: self.ground_truth.clone(),
            priors: engine.priors(),
            rounds,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            run_id = %run_id,
            trials = ?engine.trials(),
            successes = ?engine.successes(),
            "experiment completed"
        );
        Ok(history)
    }
}
