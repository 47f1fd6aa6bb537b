//! Simulation configuration: loading, defaults, and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// Simulation configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of ticks to run.
    pub ticks: u32,
    /// Failure boundary in `[0, 1]`.
    pub threshold: f64,
    /// Per-unhealthy-dependency degradation multiplier.
    pub alpha: f64,
    /// RNG seed; identical (topology, config, seed) reproduce byte-identical runs.
    pub seed: u64,
    /// Ticks a failed node waits before auto-healing. Absent disables auto-recovery.
    #[serde(default)]
    pub cooldown: Option<u32>,
    /// Health value assigned at heal time. Required if `cooldown` is set.
    #[serde(default)]
    pub heal_to: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ticks: 20,
            threshold: 0.7,
            alpha: 1.0,
            seed: 42,
            cooldown: None,
            heal_to: None,
        }
    }
}

impl SimulationConfig {
    /// Load and validate a configuration from a YAML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config: SimulationConfig =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants required by the engine.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ticks == 0 {
            return Err(ConfigError::Invalid("ticks must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Invalid(
                "threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.alpha < 0.0 {
            return Err(ConfigError::Invalid("alpha must be >= 0".to_string()));
        }
        if self.cooldown.is_some() != self.heal_to.is_some() {
            return Err(ConfigError::Invalid(
                "cooldown and heal_to must be set together".to_string(),
            ));
        }
        if let Some(heal_to) = self.heal_to {
            if !(0.0..=1.0).contains(&heal_to) {
                return Err(ConfigError::Invalid(
                    "heal_to must be in [0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_ticks_is_invalid() {
        let mut config = SimulationConfig::default();
        config.ticks = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn threshold_out_of_range_is_invalid() {
        let mut config = SimulationConfig::default();
        config.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn cooldown_without_heal_to_is_invalid() {
        let mut config = SimulationConfig::default();
        config.cooldown = Some(3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn cooldown_with_heal_to_is_valid() {
        let mut config = SimulationConfig::default();
        config.cooldown = Some(3);
        config.heal_to = Some(0.9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_parses_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "ticks: 10\nthreshold: 0.7\nalpha: 1.0\nseed: 7\ncooldown: 2\nheal_to: 0.9\n",
        )
        .unwrap();

        let config = SimulationConfig::load(&path).unwrap();
        assert_eq!(config.ticks, 10);
        assert_eq!(config.cooldown, Some(2));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = SimulationConfig::load(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
