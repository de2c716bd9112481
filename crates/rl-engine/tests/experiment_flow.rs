//! End-to-end flow: run a seeded experiment, then check the recorded
//! trajectory with the convergence diagnostics.

use banditlab_diagnostics::ConvergenceDiagnostics;
use banditlab_rl_engine::{BanditEngine, BetaPrior, ExperimentRunner, SharedBanditEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_thompson_sampling_converges_on_best_arm() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut engine = BanditEngine::new(2, None).unwrap();
    let runner = ExperimentRunner::new(10_000, vec![0.25, 0.35]).unwrap();

    let history = runner.run(&mut engine, &mut rng).unwrap();
    let summary = history.summary();

    assert_eq!(summary.rounds, 10_000);
    assert_eq!(summary.most_played_arm, 1);
    assert!(summary.arms[1].traffic_share > 0.7, "{:?}", summary.arms);
    assert!((summary.overall_rate - 0.35).abs() < 0.04);

    // Final history row agrees with the live engine.
    let last = history.final_round().unwrap();
    assert_eq!(last.trials, engine.trials());
    assert_eq!(last.successes, engine.successes());
}

#[test]
fn test_informative_priors_are_recorded() {
    let mut rng = StdRng::seed_from_u64(5);
    let priors = vec![BetaPrior::new(3.0, 7.0).unwrap(), BetaPrior::new(1.0, 1.0).unwrap()];
    let mut engine = BanditEngine::new(2, Some(priors.clone())).unwrap();
    let history = ExperimentRunner::new(50, vec![0.3, 0.4])
        .unwrap()
        .run(&mut engine, &mut rng)
        .unwrap();

    assert_eq!(history.priors, priors);
    let posteriors = history.posteriors_at(49).unwrap();
    let last = history.final_round().unwrap();
    assert_eq!(posteriors[0].alpha, 3.0 + last.successes[0] as f64);
    assert_eq!(
        posteriors[0].beta,
        7.0 + (last.trials[0] - last.successes[0]) as f64
    );
}

#[test]
fn test_ctr_trajectory_diagnostics() {
    let mut rng = StdRng::seed_from_u64(17);
    let mut engine = BanditEngine::new(3, None).unwrap();
    let history = ExperimentRunner::new(2_000, vec![0.1, 0.5, 0.3])
        .unwrap()
        .run(&mut engine, &mut rng)
        .unwrap();

    // A running average is strongly serially dependent.
    let ctr = history.empirical_ctr();
    let acf = ConvergenceDiagnostics::autocorrelation(&ctr, 10).unwrap();
    assert_eq!(acf.len(), 9);
    assert!(acf[0] > 0.9);

    // The raw outcome stream is close to independent.
    let outcomes: Vec<f64> = history
        .rounds
        .iter()
        .map(|r| if r.outcome { 1.0 } else { 0.0 })
        .collect();
    let report = ConvergenceDiagnostics::analyze(&outcomes, 0, 50).unwrap();
    assert!(report.effective_sample_size > 1_000.0);
}

#[test]
fn test_shared_engine_matches_serial_counts() {
    let shared = SharedBanditEngine::from(BanditEngine::new(2, None).unwrap());
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..100 {
        let arm = shared.recommend(&mut rng).unwrap();
        shared.update(arm, true).unwrap();
    }
    let snapshot = shared.snapshot();
    assert_eq!(snapshot.iter().map(|a| a.trials()).sum::<u64>(), 100);
    assert_eq!(shared.num_arms(), 2);
}
