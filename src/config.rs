//! Configuration management
//!
//! Server binding, storage locations, training policy and prediction bounds.
//! Every field has a default so a missing or partial config file still works.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Where the buffer and model artifact live
    #[serde(default)]
    pub storage: StorageConfig,
    /// Training cycle policy and regressor settings
    #[serde(default)]
    pub training: TrainingConfig,
    /// Prediction safety bounds
    #[serde(default)]
    pub prediction: PredictionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body size
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the buffer and the artifact
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_buffer_file")]
    pub buffer_file: String,
    #[serde(default = "default_model_file")]
    pub model_file: String,
}

fn default_data_dir() -> PathBuf {
    data_dir()
        .map(|d| d.join("models"))
        .unwrap_or_else(|_| PathBuf::from("models"))
}

fn default_buffer_file() -> String {
    "train_buffer.csv".to_string()
}

fn default_model_file() -> String {
    "amount_model.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            buffer_file: default_buffer_file(),
            model_file: default_model_file(),
        }
    }
}

impl StorageConfig {
    /// Storage rooted at an explicit directory with default file names
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            buffer_file: default_buffer_file(),
            model_file: default_model_file(),
        }
    }

    pub fn buffer_path(&self) -> PathBuf {
        self.data_dir.join(&self.buffer_file)
    }

    pub fn model_path(&self) -> PathBuf {
        self.data_dir.join(&self.model_file)
    }
}

/// Which records a cycle feeds to `partial_fit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitScope {
    /// The whole reloaded buffer
    #[default]
    Full,
    /// Only the records appended by this cycle
    Increment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Cycles with fewer new records are skipped
    #[serde(default = "default_min_records")]
    pub min_records: usize,
    #[serde(default)]
    pub fit_scope: FitScope,
    /// Upper bound the HTTP layer waits for one cycle
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Initial learning rate
    #[serde(default = "default_eta0")]
    pub eta0: f64,
    /// L2 penalty
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Minimum epoch loss improvement before the learning rate decays
    #[serde(default = "default_tol")]
    pub tol: f64,
    #[serde(default = "default_n_iter_no_change")]
    pub n_iter_no_change: u32,
    /// Passes over the fit set per cycle
    #[serde(default = "default_epochs")]
    pub epochs_per_cycle: u32,
}

fn default_min_records() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_eta0() -> f64 {
    0.01
}

fn default_alpha() -> f64 {
    0.0001
}

fn default_tol() -> f64 {
    0.001
}

fn default_n_iter_no_change() -> u32 {
    5
}

fn default_epochs() -> u32 {
    1
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_records: default_min_records(),
            fit_scope: FitScope::default(),
            timeout_secs: default_timeout_secs(),
            eta0: default_eta0(),
            alpha: default_alpha(),
            tol: default_tol(),
            n_iter_no_change: default_n_iter_no_change(),
            epochs_per_cycle: default_epochs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Upper clamp for every prediction
    #[serde(default = "default_max_payout")]
    pub max_payout: u64,
}

/// Default payout ceiling
pub const DEFAULT_MAX_PAYOUT: u64 = 500_000;

fn default_max_payout() -> u64 {
    DEFAULT_MAX_PAYOUT
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_payout: default_max_payout(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file without touching disk otherwise
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent().context("Config path has no parent")?;
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject settings the lifecycle cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.training.min_records == 0 {
            anyhow::bail!("training.min_records must be at least 1");
        }
        if !(self.training.eta0.is_finite() && self.training.eta0 > 0.0) {
            anyhow::bail!("training.eta0 must be a positive number");
        }
        if !(self.training.alpha.is_finite() && self.training.alpha >= 0.0) {
            anyhow::bail!("training.alpha must be zero or positive");
        }
        if self.training.epochs_per_cycle == 0 {
            anyhow::bail!("training.epochs_per_cycle must be at least 1");
        }
        if self.training.timeout_secs == 0 {
            anyhow::bail!("training.timeout_secs must be at least 1");
        }
        if self.prediction.max_payout == 0 {
            anyhow::bail!("prediction.max_payout must be positive");
        }
        if self.storage.buffer_file == self.storage.model_file {
            anyhow::bail!("storage.buffer_file and storage.model_file must differ");
        }
        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "agri-payout", "agri-payout")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "agri-payout", "agri-payout")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_lifecycle_policy() {
        let config = Config::default();
        assert_eq!(config.training.min_records, 3);
        assert_eq!(config.training.fit_scope, FitScope::Full);
        assert_eq!(config.prediction.max_payout, 500_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[training]\nmin_records = 5\nfit_scope = \"increment\"\n\n[storage]\ndata_dir = \"/var/lib/payout\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.training.min_records, 5);
        assert_eq!(config.training.fit_scope, FitScope::Increment);
        assert_eq!(config.training.eta0, 0.01);
        assert_eq!(config.server.port, 5000);
        assert_eq!(
            config.storage.buffer_path(),
            PathBuf::from("/var/lib/payout/train_buffer.csv")
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[prediction]\nmax_payout = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        let mut config = Config::default();
        config.training.min_records = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.server.port = 8088;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 8088);
    }

    #[test]
    fn test_default_toml_parses() {
        let parsed: Config = toml::from_str(&default_config_toml()).unwrap();
        assert_eq!(parsed.training.n_iter_no_change, 5);
    }
}
