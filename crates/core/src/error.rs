use thiserror::Error;

pub type LabResult<T> = Result<T, LabError>;

#[derive(Error, Debug)]
pub enum LabError {
    /// Malformed construction or call parameters. Raised before any state
    /// is touched, so the failed operation has no effect.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A well-formed request whose numeric result cannot be resolved.
    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LabError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_computation(&self) -> bool {
        matches!(self, Self::Computation(_))
    }
}

impl From<config::ConfigError> for LabError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
