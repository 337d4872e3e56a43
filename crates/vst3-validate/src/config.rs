use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SEED_ENV: &str = "VST3_VALIDATOR_SEED";
pub const TIMEOUT_ENV: &str = "VST3_VALIDATOR_CASE_TIMEOUT_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("VST3_VALIDATOR_SEED must be a decimal or 0x-prefixed hex integer, got `{0}`")]
    InvalidSeed(String),
    #[error("VST3_VALIDATOR_CASE_TIMEOUT_SECS must be a positive number of seconds, got `{0}`")]
    InvalidTimeout(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Driver-wide seed every case seed is derived from.
    pub seed: u64,
    pub case_timeout: Duration,
    /// Controller writes issued by the threading stress case.
    pub stress_writes: usize,
    /// Name reported through `IHostApplication::getName`.
    pub host_name: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_0F_F1C3,
            case_timeout: Duration::from_secs(30),
            stress_writes: 10_000,
            host_name: "vst3-validate".into(),
        }
    }
}

impl ValidatorConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    pub fn with_stress_writes(mut self, writes: usize) -> Self {
        self.stress_writes = writes;
        self
    }

    pub fn with_host_name<S: Into<String>>(mut self, name: S) -> Self {
        self.host_name = name.into();
        self
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    pub fn apply_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(SEED_ENV) {
            self.seed = parse_seed(&raw).ok_or(ConfigError::InvalidSeed(raw))?;
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let seconds = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .ok_or(ConfigError::InvalidTimeout(raw))?;
            self.case_timeout = Duration::from_secs_f64(seconds);
        }
        Ok(self)
    }
}

fn parse_seed(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ValidatorConfig::default()
            .apply_env(lookup(&[(SEED_ENV, "0x2A"), (TIMEOUT_ENV, "1.5")]))
            .unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.case_timeout, Duration::from_millis(1500));
        assert_eq!(config.stress_writes, 10_000);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = ValidatorConfig::default()
            .apply_env(lookup(&[(TIMEOUT_ENV, "-3")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidTimeout("-3".into()));
        assert!(ValidatorConfig::default()
            .apply_env(lookup(&[(SEED_ENV, "seed")]))
            .is_err());
    }
}
