//! Flow configuration

use crate::game::logger::{FlowLogger, OutputMode, VerbosityLevel};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default staleness timeout for queued commands
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 1000;

/// Settings for one duel flow. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Commands attempted this long after enqueue are dropped
    pub command_timeout_ms: u64,
    pub verbosity: VerbosityLevel,
    pub output_mode: OutputMode,
    /// Seed for the duel RNG (tie-breaks)
    pub seed: u64,
    /// Name given to the duel thread
    pub thread_name: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            verbosity: VerbosityLevel::default(),
            output_mode: OutputMode::default(),
            seed: 0,
            thread_name: "duel-flow".to_string(),
        }
    }
}

impl FlowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_verbosity(mut self, verbosity: VerbosityLevel) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Self {
        self.output_mode = output_mode;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn build_logger(&self) -> FlowLogger {
        let mut logger = FlowLogger::with_verbosity(self.verbosity);
        logger.set_output_mode(self.output_mode);
        logger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(1));
        assert_eq!(config.verbosity, VerbosityLevel::Normal);
        assert_eq!(config.thread_name, "duel-flow");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = FlowConfig::from_json_str(r#"{ "seed": 42, "verbosity": "Verbose" }"#).unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.verbosity, VerbosityLevel::Verbose);
        assert_eq!(config.command_timeout_ms, DEFAULT_COMMAND_TIMEOUT_MS);

        assert!(FlowConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_builders_and_logger() {
        let config = FlowConfig::new()
            .with_command_timeout(Duration::from_millis(250))
            .with_output_mode(OutputMode::Memory)
            .with_verbosity(VerbosityLevel::Minimal);
        assert_eq!(config.command_timeout_ms, 250);

        let logger = config.build_logger();
        assert!(logger.is_capturing());
        assert_eq!(logger.verbosity(), VerbosityLevel::Minimal);

        let round = FlowConfig::from_json_str(&config.to_json_pretty().unwrap()).unwrap();
        assert_eq!(round, config);
    }
}
