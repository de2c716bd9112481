use std::path::Path;

use serde::Deserialize;

use crate::error::{LabError, LabResult};

/// Root lab configuration. Loaded from an optional TOML file and from
/// environment variables with the prefix `BANDITLAB__`.
#[derive(Debug, Clone, Deserialize)]
pub struct LabConfig {
    #[serde(default)]
    pub bandit: BanditConfig,
    #[serde(default)]
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanditConfig {
    #[serde(default = "default_prior_alpha")]
    pub default_prior_alpha: f64,
    #[serde(default = "default_prior_beta")]
    pub default_prior_beta: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default = "default_ground_truth")]
    pub ground_truth: Vec<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_max_lag")]
    pub max_lag: usize,
    #[serde(default)]
    pub burnin: usize,
}

// Default functions
fn default_prior_alpha() -> f64 {
    1.0
}
fn default_prior_beta() -> f64 {
    1.0
}
fn default_rounds() -> usize {
    10_000
}
fn default_ground_truth() -> Vec<f64> {
    vec![0.25, 0.35]
}
fn default_max_lag() -> usize {
    100
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            default_prior_alpha: default_prior_alpha(),
            default_prior_beta: default_prior_beta(),
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            ground_truth: default_ground_truth(),
            seed: None,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_lag: default_max_lag(),
            burnin: 0,
        }
    }
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            bandit: BanditConfig::default(),
            experiment: ExperimentConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl LabConfig {
    /// Load configuration from environment variables and an optional config file.
    /// Environment values win over file values.
    pub fn load(path: Option<&Path>) -> LabResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("BANDITLAB")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("experiment.ground_truth"),
        );

        let config: LabConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LabResult<()> {
        if !(self.bandit.default_prior_alpha > 0.0) || !(self.bandit.default_prior_beta > 0.0) {
            return Err(LabError::Config(format!(
                "default prior must be strictly positive, got ({}, {})",
                self.bandit.default_prior_alpha, self.bandit.default_prior_beta
            )));
        }
        if self.experiment.rounds == 0 {
            return Err(LabError::Config("experiment.rounds must be positive".into()));
        }
        if self.experiment.ground_truth.is_empty() {
            return Err(LabError::Config(
                "experiment.ground_truth needs at least one arm".into(),
            ));
        }
        if self.diagnostics.max_lag < 2 {
            return Err(LabError::Config(format!(
                "diagnostics.max_lag must be at least 2, got {}",
                self.diagnostics.max_lag
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = LabConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.experiment.rounds, 10_000);
        assert_eq!(config.experiment.ground_truth, vec![0.25, 0.35]);
        assert_eq!(config.diagnostics.max_lag, 100);
        assert_eq!(config.bandit.default_prior_alpha, 1.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = LabConfig::default();
        config.bandit.default_prior_beta = 0.0;
        assert!(matches!(config.validate(), Err(LabError::Config(_))));

        let mut config = LabConfig::default();
        config.diagnostics.max_lag = 1;
        assert!(config.validate().is_err());

        let mut config = LabConfig::default();
        config.experiment.ground_truth.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!("banditlab-config-{}.toml", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "[experiment]\nrounds = 500\nground_truth = [0.1, 0.2, 0.3]\nseed = 7").unwrap();
            writeln!(file, "[diagnostics]\nmax_lag = 40").unwrap();
        }

        let config = LabConfig::load(Some(path.as_path())).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.experiment.rounds, 500);
        assert_eq!(config.experiment.ground_truth.len(), 3);
        assert_eq!(config.experiment.seed, Some(7));
        assert_eq!(config.diagnostics.max_lag, 40);
        assert_eq!(config.diagnostics.burnin, 0);
    }
}
