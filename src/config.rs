use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReformError, Result};
use crate::utils::secs_to_ticks;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TSREFORM_CONFIG";

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./tsreform.toml", "./tsreform_config.toml"];

/// Tuning constants of the reformation engine.
///
/// The audio thresholds are expressed as fractions of one audio frame period.
/// Their defaults were tuned against real broadcast captures; change them only
/// with recordings that show the need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReformConfig {
    /// Format changes closer than this to the open section's start are folded
    /// into it.
    pub section_merge_tolerance_secs: f64,
    /// A modified PTS stepping back further than this is unrecoverable.
    pub max_pts_regression_secs: f64,
    /// A source frame may start this far before the fill cursor and still be used.
    pub early_accept_ratio: f64,
    /// A source frame starting later than this far into the last frame period
    /// before the target end is deferred to the next video frame.
    pub late_accept_ratio: f64,
    /// A gap of at least (1 - ratio) frame periods is repaired by repetition.
    pub gap_tolerance_ratio: f64,
    /// How far before the fill cursor a resync candidate may start.
    pub resync_tolerance_ratio: f64,
    /// Candidates examined by one resync search.
    pub resync_scan_limit: usize,
}

impl Default for ReformConfig {
    fn default() -> Self {
        Self {
            section_merge_tolerance_secs: 3.0,
            max_pts_regression_secs: 60.0,
            early_accept_ratio: 0.5,
            late_accept_ratio: 0.75,
            gap_tolerance_ratio: 0.25,
            resync_tolerance_ratio: 0.5,
            resync_scan_limit: 256,
        }
    }
}

impl ReformConfig {
    /// Loads defaults, then the first config file found, then environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) => {
                log::info!("Loading reform config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ReformConfig = toml::from_str(content)
            .map_err(|e| ReformError::Config(format!("failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_f64("TSREFORM_MERGE_TOLERANCE_SECS")? {
            self.section_merge_tolerance_secs = v;
        }
        if let Some(v) = env_f64("TSREFORM_MAX_PTS_REGRESSION_SECS")? {
            self.max_pts_regression_secs = v;
        }
        Ok(())
    }

    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.section_merge_tolerance_secs >= 0.0) {
            return Err(ReformError::Config(format!(
                "section_merge_tolerance_secs must be non-negative, got {}",
                self.section_merge_tolerance_secs
            )));
        }
        if !(self.max_pts_regression_secs > 0.0) {
            return Err(ReformError::Config(format!(
                "max_pts_regression_secs must be positive, got {}",
                self.max_pts_regression_secs
            )));
        }
        let ratios = [
            ("early_accept_ratio", self.early_accept_ratio),
            ("late_accept_ratio", self.late_accept_ratio),
            ("gap_tolerance_ratio", self.gap_tolerance_ratio),
            ("resync_tolerance_ratio", self.resync_tolerance_ratio),
        ];
        for (name, value) in ratios {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ReformError::Config(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.resync_scan_limit == 0 {
            return Err(ReformError::Config(
                "resync_scan_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Merge window in 90 kHz ticks.
    pub fn section_merge_tolerance_ticks(&self) -> f64 {
        secs_to_ticks(self.section_merge_tolerance_secs)
    }

    /// Largest tolerated PTS step back, in 90 kHz ticks.
    pub fn max_pts_regression_ticks(&self) -> i64 {
        secs_to_ticks(self.max_pts_regression_secs) as i64
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| ReformError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Writes a commented config template if `path` does not exist yet.
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# tsreform configuration
# Every key is optional; missing keys keep their default.

# Format changes closer together than this (seconds) form one transition
section_merge_tolerance_secs = 3.0

# PTS stepping back further than this (seconds) aborts processing
max_pts_regression_secs = 60.0

# Audio matching thresholds, as fractions of one audio frame period
early_accept_ratio = 0.5
late_accept_ratio = 0.75
gap_tolerance_ratio = 0.25
resync_tolerance_ratio = 0.5

# Candidates examined by one resynchronization search
resync_scan_limit = 256
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}
