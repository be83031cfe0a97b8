//! Engine configuration.
//!
//! Precedence, lowest to highest: built-in defaults, an optional YAML file,
//! then `EDU_SENSE_*` environment variables (`__` separates nested keys,
//! e.g. `EDU_SENSE_DETECTOR__MIN_ATTEMPTS_THRESHOLD=5`).

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_PREFIX: &str = "EDU_SENSE_";

/// Upper bound on recommendations returned for one analysis.
pub const MAX_RECOMMENDATIONS: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be between 0 and 1, got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error(
        "severity bands out of order: high_severity_accuracy ({0}) must not exceed medium_severity_accuracy ({1})"
    )]
    SeverityBands(f64, f64),

    #[error("max_recommendations must be at least 1")]
    NoRecommendations,

    #[error("max_recommendations must be at most {MAX_RECOMMENDATIONS}, got {0}")]
    TooManyRecommendations(usize),

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Thresholds for the three gap detectors and the overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Topics with fewer attempts than this are not evaluated.
    pub min_attempts_threshold: usize,
    /// A topic below this accuracy is flagged as a concept gap.
    pub concept_accuracy_gate: f64,
    pub high_severity_accuracy: f64,
    pub medium_severity_accuracy: f64,
    /// Attempts slower than `avg_time * slow_time_factor` count as hesitant.
    pub slow_time_factor: f64,
    pub confidence_gap_ratio: f64,
    pub confidence_high_ratio: f64,
    /// Attempts faster than `avg_time * fast_time_factor` count as rushed.
    pub fast_time_factor: f64,
    /// The speed detector needs strictly more rushed attempts than this.
    pub min_fast_attempts: usize,
    pub speed_gap_ratio: f64,
    pub gap_penalty: f64,
    pub consistency_bonus: f64,
    /// Bonus applies when std dev of time is below `mean * consistency_spread`.
    pub consistency_spread: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_attempts_threshold: 3,
            concept_accuracy_gate: 0.6,
            high_severity_accuracy: 0.4,
            medium_severity_accuracy: 0.7,
            slow_time_factor: 1.5,
            confidence_gap_ratio: 0.5,
            confidence_high_ratio: 0.7,
            fast_time_factor: 0.5,
            min_fast_attempts: 2,
            speed_gap_ratio: 0.4,
            gap_penalty: 0.1,
            consistency_bonus: 0.05,
            consistency_spread: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    pub max_recommendations: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            max_recommendations: MAX_RECOMMENDATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Directory for rolling log files; the platform data directory when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detector: DetectorConfig,
    pub recommender: RecommenderConfig,
    pub logging: LogConfig,
}

impl EngineConfig {
    /// Load defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(EngineConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: EngineConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to extract configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;

        for (name, value) in [
            ("concept_accuracy_gate", d.concept_accuracy_gate),
            ("high_severity_accuracy", d.high_severity_accuracy),
            ("medium_severity_accuracy", d.medium_severity_accuracy),
            ("confidence_gap_ratio", d.confidence_gap_ratio),
            ("confidence_high_ratio", d.confidence_high_ratio),
            ("speed_gap_ratio", d.speed_gap_ratio),
            ("gap_penalty", d.gap_penalty),
            ("consistency_bonus", d.consistency_bonus),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { name, value });
            }
        }

        for (name, value) in [
            ("slow_time_factor", d.slow_time_factor),
            ("fast_time_factor", d.fast_time_factor),
            ("consistency_spread", d.consistency_spread),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        if d.high_severity_accuracy > d.medium_severity_accuracy {
            return Err(ConfigError::SeverityBands(
                d.high_severity_accuracy,
                d.medium_severity_accuracy,
            ));
        }

        match self.recommender.max_recommendations {
            0 => return Err(ConfigError::NoRecommendations),
            n if n > MAX_RECOMMENDATIONS => {
                return Err(ConfigError::TooManyRecommendations(n));
            }
            _ => {}
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detector.min_attempts_threshold, 3);
        assert_eq!(config.detector.concept_accuracy_gate, 0.6);
        assert_eq!(config.recommender.max_recommendations, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_file_overrides_nested_fields() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "detector:\n  min_attempts_threshold: 5\nrecommender:\n  max_recommendations: 2"
        )
        .unwrap();
        file.flush().unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.detector.min_attempts_threshold, 5);
        assert_eq!(config.recommender.max_recommendations, 2);
        assert_eq!(config.detector.speed_gap_ratio, 0.4, "untouched default");
    }

    #[test]
    fn test_load_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "detector:\n  concept_accuracy_gate: 1.5").unwrap();
        file.flush().unwrap();

        assert!(EngineConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_load_file_rejects_recommendation_cap_above_five() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "recommender:\n  max_recommendations: 6").unwrap();
        file.flush().unwrap();

        assert!(EngineConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::load(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_validate_catches_each_rule() {
        let mut config = EngineConfig::default();
        config.detector.fast_time_factor = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive {
                name: "fast_time_factor",
                value: 0.0
            })
        );

        let mut config = EngineConfig::default();
        config.detector.high_severity_accuracy = 0.8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SeverityBands(_, _))
        ));

        let mut config = EngineConfig::default();
        config.recommender.max_recommendations = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoRecommendations));

        let mut config = EngineConfig::default();
        config.recommender.max_recommendations = 10;
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyRecommendations(10))
        );

        let mut config = EngineConfig::default();
        config.logging.level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }
}
