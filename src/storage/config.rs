//! JSON Configuration Management
//!
//! Handles reading and writing the configuration file, then overlaying
//! environment variables on top of it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::models::settings::Settings;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_parent_dir};

/// Configuration service for managing settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigService {
    /// Create a config service at the default location, creating defaults if missing
    pub fn new() -> AppResult<Self> {
        Self::from_path(config_path()?)
    }

    /// Create a config service backed by `path`, creating defaults if missing
    pub fn from_path(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        let settings = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            ensure_parent_dir(&config_path)?;
            let defaults = Settings::default();
            Self::save_to_file(&config_path, &defaults)?;
            info!(path = %config_path.display(), "wrote default configuration");
            defaults
        };

        Ok(Self {
            config_path,
            settings,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<Settings> {
        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate().map_err(AppError::validation)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(settings)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, settings: &Settings) -> AppResult<()> {
        settings.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Overlay environment variables onto the loaded settings.
    ///
    /// The overlay lives in memory only; `save` writes it back if asked.
    pub fn apply_environment<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut overlaid = self.settings.clone();
        overlaid.apply_env(lookup);
        overlaid.validate().map_err(AppError::validation)?;
        self.settings = overlaid;
        Ok(())
    }

    /// Get the current settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable access for callers applying CLI overrides
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.settings)
    }

    /// Reload configuration from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.settings = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Reset configuration to defaults
    pub fn reset(&mut self) -> AppResult<()> {
        self.settings = Settings::default();
        self.save()
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            settings: Settings::default(),
        }
    }
}
