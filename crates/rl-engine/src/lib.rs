//! Reinforcement learning engine — Beta-Bernoulli Thompson Sampling bandit,
//! a shared (locked) engine handle, and an experiment runner that records the
//! full per-round trajectory.

pub mod bandits;
pub mod random;
pub mod runner;

pub use bandits::{ArmState, BanditEngine, BetaPrior, SharedBanditEngine};
pub use random::RandomSource;
pub use runner::{ExperimentHistory, ExperimentRunner, ExperimentSummary, RoundRecord};
