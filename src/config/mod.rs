use crate::models::Settings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the persisted user settings.
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Loads and saves [`Settings`] as YAML inside a configuration directory.
///
/// A missing or unreadable settings file never stops the application: the
/// loader falls back to defaults and logs why.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `settings.yaml` (e.g., "Update Manager Data")
    ///
    /// # Returns
    /// A new ConfigManager instance
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Read the settings file.
    ///
    /// # Returns
    /// `Ok(None)` when the file does not exist, an error when it cannot be read or parsed
    pub fn try_load_settings(&self) -> Result<Option<Settings>> {
        if !self.settings_path.exists() {
            return Ok(None);
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: Settings = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(Some(settings))
    }

    /// Load the settings, falling back to defaults when the file is missing or corrupt.
    pub fn load_settings(&self) -> Settings {
        match self.try_load_settings() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::warn!(
                    "Settings file not found at {}, using defaults",
                    self.settings_path
                );
                Settings::default()
            }
            Err(e) => {
                tracing::warn!("{:#}; using defaults", e);
                Settings::default()
            }
        }
    }

    /// Save the settings file.
    ///
    /// # Arguments
    /// * `settings` - The Settings to save
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Create the repository directory if it does not exist yet.
    pub fn prepare_repository(&self, repo_path: &Utf8Path) -> Result<()> {
        if !repo_path.exists() {
            fs::create_dir_all(repo_path)
                .with_context(|| format!("Failed to create repository: {}", repo_path))?;
            tracing::info!("Created repository at {}", repo_path);
        }
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, ConfigManager) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(dir).unwrap();
        (temp_dir, manager)
    }

    #[test]
    fn test_create_config_manager() {
        let (_temp_dir, manager) = manager();
        assert!(manager.config_dir().exists());
        assert!(manager.settings_path().ends_with("settings.yaml"));
    }

    #[test]
    fn test_missing_settings_yield_defaults() {
        let (_temp_dir, manager) = manager();
        assert!(manager.try_load_settings().unwrap().is_none());
        assert_eq!(manager.load_settings(), Settings::default());
    }

    #[test]
    fn test_save_then_load_settings() {
        let (_temp_dir, manager) = manager();
        let mut settings = Settings::default();
        settings.auto_reboot = true;
        settings.performance_mode = true;
        settings.update_categories.insert("office".to_string(), false);

        manager.save_settings(&settings).unwrap();

        assert_eq!(manager.load_settings(), settings);
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        let (_temp_dir, manager) = manager();
        fs::write(manager.settings_path(), "auto_reboot: [not, a, bool").unwrap();

        assert!(manager.try_load_settings().is_err());
        assert_eq!(manager.load_settings(), Settings::default());
    }

    #[test]
    fn test_prepare_repository_creates_directory() {
        let (temp_dir, manager) = manager();
        let repo = Utf8PathBuf::try_from(temp_dir.path().join("repo")).unwrap();

        manager.prepare_repository(&repo).unwrap();

        assert!(repo.is_dir());
    }
}
