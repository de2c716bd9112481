//! Bandit Lab — Thompson Sampling experiments and MCMC convergence diagnostics.
//!
//! `simulate` runs a seeded bandit experiment and prints its summary as JSON;
//! `diagnose` reads a sample trace and prints its autocorrelation report.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use banditlab_core::LabConfig;
use banditlab_diagnostics::ConvergenceDiagnostics;
use banditlab_rl_engine::{BanditEngine, BetaPrior, ExperimentRunner};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "banditlab")]
#[command(about = "Thompson Sampling bandit experiments and chain convergence diagnostics")]
#[command(version)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, global = true, env = "BANDITLAB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a bandit experiment against ground-truth success rates
    Simulate {
        /// Number of rounds (overrides config)
        #[arg(short, long)]
        rounds: Option<usize>,

        /// Comma-separated true success rate per arm (overrides config)
        #[arg(long, value_delimiter = ',')]
        rates: Option<Vec<f64>>,

        /// Draw this many random true rates instead of using configured ones
        #[arg(long, conflicts_with = "rates")]
        arms: Option<usize>,

        /// Per-arm prior as ALPHA:BETA, repeated once per arm
        #[arg(long = "prior", value_parser = parse_prior)]
        priors: Vec<BetaPrior>,

        /// RNG seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Print the full per-round history instead of the summary
        #[arg(long, default_value_t = false)]
        full: bool,
    },

    /// Autocorrelation and effective sample size of a sample trace
    Diagnose {
        /// File with whitespace- or comma-separated samples
        #[arg(short, long)]
        input: PathBuf,

        /// Leading samples to discard (overrides config)
        #[arg(long)]
        burnin: Option<usize>,

        /// Maximum lag (overrides config)
        #[arg(long)]
        max_lag: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banditlab=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            rounds,
            rates,
            arms,
            priors,
            seed,
            full,
        } => {
            let rounds = rounds.unwrap_or(config.experiment.rounds);
            let seed = seed.or(config.experiment.seed).unwrap_or_else(rand::random);
            let mut rng = StdRng::seed_from_u64(seed);

            let runner = match (rates, arms) {
                (Some(rates), _) => ExperimentRunner::new(rounds, rates)?,
                (None, Some(k)) => ExperimentRunner::with_random_rates(rounds, k, &mut rng)?,
                (None, None) => ExperimentRunner::new(rounds, config.experiment.ground_truth.clone())?,
            };
            let k = runner.ground_truth().len();

            let priors = if priors.is_empty() {
                let default =
                    BetaPrior::new(config.bandit.default_prior_alpha, config.bandit.default_prior_beta)?;
                vec![default; k]
            } else {
                priors
            };

            info!(seed, rounds, arms = k, "Running experiment");
            let mut engine = BanditEngine::new(k, Some(priors))?;
            let history = runner.run(&mut engine, &mut rng)?;

            let output = if full {
                serde_json::to_string_pretty(&history)?
            } else {
                serde_json::to_string_pretty(&history.summary())?
            };
            println!("{output}");
        }
        Commands::Diagnose {
            input,
            burnin,
            max_lag,
        } => {
            let samples = read_samples(&input)?;
            let burnin = burnin.unwrap_or(config.diagnostics.burnin);
            let max_lag = max_lag.unwrap_or(config.diagnostics.max_lag);

            info!(samples = samples.len(), burnin, max_lag, "Diagnosing chain");
            let report = ConvergenceDiagnostics::analyze(&samples, burnin, max_lag)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// An explicitly named config file must load; without one, a broken
/// environment only falls back to defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<LabConfig> {
    match path {
        Some(path) => LabConfig::load(Some(path))
            .with_context(|| format!("Failed to load config file {}", path.display())),
        None => Ok(LabConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            LabConfig::default()
        })),
    }
}

fn parse_prior(s: &str) -> Result<BetaPrior, String> {
    let (alpha, beta) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ALPHA:BETA, got '{s}'"))?;
    let alpha: f64 = alpha.trim().parse().map_err(|e| format!("bad alpha '{alpha}': {e}"))?;
    let beta: f64 = beta.trim().parse().map_err(|e| format!("bad beta '{beta}': {e}"))?;
    BetaPrior::new(alpha, beta).map_err(|e| e.to_string())
}

fn read_samples(path: &Path) -> anyhow::Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;
    parse_samples(&text)
}

fn parse_samples(text: &str) -> anyhow::Result<Vec<f64>> {
    let mut samples = Vec::new();
    for token in text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        match token.parse::<f64>() {
            Ok(value) => samples.push(value),
            Err(e) => bail!("Invalid sample '{token}': {e}"),
        }
    }
    Ok(samples)
}
