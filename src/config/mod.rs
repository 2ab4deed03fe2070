//! Run configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `LADDERPATH_*` environment variables. Command-line flags are applied last
//! by the CLI.

use crate::decompose::{DecomposerConfig, LadderpathSettings};
use crate::error::{ErrorCode, PipelineError, Result};
use crate::orchestrator::DispatchMode;
use crate::sequence::{Alphabet, SourceFormat, DEFAULT_SEQUENCE_COLUMN};
use crate::worker::WorkerSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_MAX_LENGTH: &str = "LADDERPATH_MAX_LENGTH";
pub const ENV_NUM_WORKERS: &str = "LADDERPATH_NUM_WORKERS";
pub const ENV_OUTPUT_FOLDER: &str = "LADDERPATH_OUTPUT_FOLDER";
pub const ENV_TOP_K: &str = "LADDERPATH_TOP_K";
pub const ENV_LOG_LEVEL: &str = "LADDERPATH_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on the summed unit length of one batch
    pub max_length: usize,
    /// Workers in flight at once
    pub num_workers: usize,
    /// Folder receiving per-batch artifacts
    pub output_folder: PathBuf,
    /// Folder receiving the decomposition program's own save files
    pub ladder_folder: PathBuf,
    pub top_k: usize,
    pub alphabet: String,
    #[serde(with = "humantime_serde")]
    pub pacing_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub worker_timeout: Option<Duration>,
    pub dispatch: DispatchMode,
    /// Tracing filter directive, e.g. `debug` or `ladderpath_vocab=trace`
    pub log_level: Option<String>,
    pub sequence_column: String,
    pub sequence_format: Option<SourceFormat>,
    pub ladderpath: LadderpathSettings,
    pub decomposer: DecomposerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_length: 1_000_000,
            num_workers: 50,
            output_folder: PathBuf::from("./hg19_json_file"),
            ladder_folder: PathBuf::from("./hg19_ladder_file"),
            top_k: 1000,
            alphabet: "ATCG".to_string(),
            pacing_delay: Duration::from_secs(2),
            worker_timeout: None,
            dispatch: DispatchMode::Wave,
            log_level: None,
            sequence_column: DEFAULT_SEQUENCE_COLUMN.to_string(),
            sequence_format: None,
            ladderpath: LadderpathSettings::default(),
            decomposer: DecomposerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid with `path` when given, then with the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env_vars()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config_with_code(
                ErrorCode::CONFIG_NOT_FOUND,
                format!("cannot read configuration file {}", path.display()),
                None,
            )
            .with_source(e)
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content).map_err(|e| e.with_context(path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides found through `lookup`, keyed by variable name
    pub fn merge_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_LENGTH) {
            self.max_length = parse_env(ENV_MAX_LENGTH, &value)?;
        }
        if let Some(value) = lookup(ENV_NUM_WORKERS) {
            self.num_workers = parse_env(ENV_NUM_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_OUTPUT_FOLDER) {
            self.output_folder = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_TOP_K) {
            self.top_k = parse_env(ENV_TOP_K, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = Some(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("max_length", self.max_length),
            ("num_workers", self.num_workers),
            ("top_k", self.top_k),
        ] {
            if value == 0 {
                return Err(PipelineError::config_with_code(
                    ErrorCode::CONFIG_VALIDATION_FAILED,
                    "must be a positive integer",
                    Some(field),
                ));
            }
        }

        self.alphabet()?;

        if self.decomposer.program.trim().is_empty() {
            return Err(PipelineError::config_with_code(
                ErrorCode::CONFIG_VALIDATION_FAILED,
                "decomposer program must not be empty",
                Some("decomposer.program"),
            ));
        }
        Ok(())
    }

    pub fn alphabet(&self) -> Result<Alphabet> {
        Alphabet::parse(&self.alphabet)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            output_folder: self.output_folder.clone(),
            ladder_folder: self.ladder_folder.clone(),
            pacing_delay: self.pacing_delay,
            ladderpath: self.ladderpath.clone(),
        }
    }
}

fn parse_env(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|e| {
        PipelineError::config_with_code(
            ErrorCode::CONFIG_INVALID_VALUE,
            format!("{}={:?} is not a non-negative integer", key, value),
            Some(key),
        )
        .with_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_length, 1_000_000);
        assert_eq!(config.num_workers, 50);
        assert_eq!(config.output_folder, PathBuf::from("./hg19_json_file"));
        assert_eq!(config.top_k, 1000);
        assert_eq!(config.alphabet, "ATCG");
        assert_eq!(config.pacing_delay, Duration::from_secs(2));
        assert_eq!(config.worker_timeout, None);
        assert_eq!(config.dispatch, DispatchMode::Wave);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
max_length = 5000
dispatch = "pool"
pacing_delay = "500ms"
worker_timeout = "30m"

[decomposer]
program = "python3"
args = ["decompose.py"]

[ladderpath]
eta_samples = 20
"#,
        )
        .unwrap();

        assert_eq!(config.max_length, 5000);
        assert_eq!(config.num_workers, 50);
        assert_eq!(config.dispatch, DispatchMode::Pool);
        assert_eq!(config.pacing_delay, Duration::from_millis(500));
        assert_eq!(config.worker_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(config.decomposer.program, "python3");
        assert_eq!(config.decomposer.args, vec!["decompose.py"]);
        assert_eq!(config.ladderpath.eta_samples, 20);
        assert_eq!(config.ladderpath.info, "V1.0.0.20240910_Alpha");
    }

    #[test]
    fn test_invalid_toml() {
        let err = PipelineConfig::from_toml_str("max_length = [").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_TOML);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_MAX_LENGTH, "2048"),
            (ENV_NUM_WORKERS, "8"),
            (ENV_OUTPUT_FOLDER, "/data/poms"),
            (ENV_TOP_K, "10"),
            (ENV_LOG_LEVEL, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config
            .merge_env_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.max_length, 2048);
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.output_folder, PathBuf::from("/data/poms"));
        assert_eq!(config.top_k, 10);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_unparsable_env_value() {
        let mut config = PipelineConfig::default();
        let err = config
            .merge_env_with(|key| (key == ENV_NUM_WORKERS).then(|| "-3".to_string()))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_VALUE);
    }

    #[test]
    fn test_validation_rejects_zero_and_empty_values() {
        let mut config = PipelineConfig {
            num_workers: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_VALIDATION_FAILED);
        assert!(err.user_message().contains("num_workers"));

        config.num_workers = 4;
        config.alphabet = String::new();
        assert!(config.validate().is_err());

        config.alphabet = "ACGT".to_string();
        config.decomposer.program = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let err = PipelineConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_worker_settings_follow_config() {
        let config = PipelineConfig {
            output_folder: PathBuf::from("poms"),
            pacing_delay: Duration::ZERO,
            ..Default::default()
        };
        let settings = config.worker_settings();
        assert_eq!(settings.output_folder, PathBuf::from("poms"));
        assert_eq!(settings.pacing_delay, Duration::ZERO);
        assert_eq!(
            settings.ladder_file(12),
            PathBuf::from("./hg19_ladder_file/ladder_12.json")
        );
    }
}
