// ⚙️ Planner Configuration
// Paths to artifacts and tuning knobs, from environment or a JSON file

use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TOP_K: usize = 8;
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.20;
pub const DEFAULT_PRIOR_FLOOR_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// SQLite database holding ledgers, total budgets and the recommendation record
    pub database_path: PathBuf,

    /// Program catalog JSON (None = built-in catalog)
    pub catalog_path: Option<PathBuf>,

    /// Sequence scorer artifact (None = built-in affinity table)
    pub scorer_path: Option<PathBuf>,

    /// Budget regressor artifact (required for budgeting)
    pub budget_model_path: PathBuf,

    /// Programs kept per household
    pub top_k: usize,

    /// Minimum Jaccard similarity for a ledger row to match a program
    pub match_threshold: f64,

    /// Fraction of the historical mean used as the raw prediction floor
    pub prior_floor_ratio: f64,

    /// Address the HTTP server binds to
    pub bind_addr: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            database_path: PathBuf::from("planner.db"),
            catalog_path: None,
            scorer_path: None,
            budget_model_path: PathBuf::from("data/budget_model.json"),
            top_k: DEFAULT_TOP_K,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            prior_floor_ratio: DEFAULT_PRIOR_FLOOR_RATIO,
            bind_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

impl PlannerConfig {
    /// Build from `PLANNER_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = PlannerConfig::default();

        let config = PlannerConfig {
            database_path: std::env::var("PLANNER_DATABASE")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            catalog_path: std::env::var("PLANNER_CATALOG").ok().map(PathBuf::from),
            scorer_path: std::env::var("PLANNER_SCORER").ok().map(PathBuf::from),
            budget_model_path: std::env::var("PLANNER_BUDGET_MODEL")
                .map(PathBuf::from)
                .unwrap_or(defaults.budget_model_path),
            top_k: parse_env("PLANNER_TOP_K")?.unwrap_or(defaults.top_k),
            match_threshold: parse_env("PLANNER_MATCH_THRESHOLD")?
                .unwrap_or(defaults.match_threshold),
            prior_floor_ratio: parse_env("PLANNER_PRIOR_FLOOR")?
                .unwrap_or(defaults.prior_floor_ratio),
            bind_addr: std::env::var("PLANNER_BIND").unwrap_or(defaults.bind_addr),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file; missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            PlannerError::Configuration(format!(
                "cannot read config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let config: PlannerConfig = serde_json::from_str(&content)
            .map_err(|e| PlannerError::Configuration(format!("invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(PlannerError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err(PlannerError::Configuration(format!(
                "match_threshold must be in (0, 1], got {}",
                self.match_threshold
            )));
        }
        if !(self.prior_floor_ratio >= 0.0) {
            return Err(PlannerError::Configuration(format!(
                "prior_floor_ratio must be non-negative, got {}",
                self.prior_floor_ratio
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            PlannerError::Configuration(format!("{} has an invalid value: '{}'", key, raw))
        }),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, 8);
        assert_eq!(config.match_threshold, 0.20);
        assert_eq!(config.prior_floor_ratio, 0.25);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PlannerConfig::default();
        config.top_k = 0;
        assert!(matches!(
            config.validate(),
            Err(PlannerError::Configuration(_))
        ));

        let mut config = PlannerConfig::default();
        config.match_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = PlannerConfig::default();
        config.prior_floor_ratio = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "top_k": 5, "database_path": "/tmp/x.db" }}"#).unwrap();

        let config = PlannerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_from_file_missing() {
        let result = PlannerConfig::from_file("/nonexistent/planner.json");
        assert!(matches!(result, Err(PlannerError::Configuration(_))));
    }
}
