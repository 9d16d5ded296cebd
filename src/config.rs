use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::writer::WriterError;

/// Process-wide switches for the writer family.
///
/// Loaded once at startup and handed to `AtomicWriter::new`; never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Skip every validator in every session.
    pub checks_disabled: bool,
    /// Skip only the similar-size check.
    pub similar_size_disabled: bool,
    /// Scales every similar-size percentage limit.
    pub limit_multiplier: f64,
}

impl WriterConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let home =
            home::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".safewrite"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load from the default location, falling back to defaults if absent.
    pub fn load_default() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WriterError> {
        if !self.limit_multiplier.is_finite() || self.limit_multiplier <= 0.0 {
            return Err(WriterError::InvalidLimit {
                name: "limit_multiplier",
                value: self.limit_multiplier,
                expected: "a finite positive number",
            });
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            checks_disabled: false,
            similar_size_disabled: false,
            limit_multiplier: 1.0,
        }
    }
}
