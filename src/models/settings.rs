use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::render::RenderPolicy;

/// Name of the sub-directory of the repository that holds downloaded packages.
pub const DOWNLOADS_DIR: &str = "Downloads";

/// Name of the download manifest written at the repository root.
pub const MANIFEST_FILE: &str = "updates_manifest.json";

/// Update categories known to the application, in display order.
pub const CATEGORY_WINDOWS: &str = "windows";
pub const CATEGORY_OFFICE: &str = "office";
pub const CATEGORY_DOTNET: &str = "dotnet";
pub const CATEGORY_VCREDIST: &str = "vcredist";

/// User settings persisted to `settings.yaml`.
///
/// Every field has a default, so a partial or older file still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Repository directory for offline packages and the manifest
    #[serde(default = "default_repo_path")]
    pub repo_path: Utf8PathBuf,

    /// Per-category enable flags; insertion order is display order
    #[serde(default = "default_update_categories")]
    pub update_categories: IndexMap<String, bool>,

    /// Schedule a reboot after a successful install
    #[serde(default)]
    pub auto_reboot: bool,

    #[serde(default)]
    pub dark_mode: bool,

    /// Windowed log rendering instead of per-line appends
    #[serde(default)]
    pub performance_mode: bool,

    /// Debug-level diagnostic logging
    #[serde(default)]
    pub debug_mode: bool,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub render: RenderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repo_path: default_repo_path(),
            update_categories: default_update_categories(),
            auto_reboot: false,
            dark_mode: false,
            performance_mode: false,
            debug_mode: false,
            timeouts: TimeoutSettings::default(),
            render: RenderSettings::default(),
        }
    }
}

impl Settings {
    /// Whether updates for `category` are enabled. Unknown categories are enabled.
    pub fn category_enabled(&self, category: &str) -> bool {
        self.update_categories.get(category).copied().unwrap_or(true)
    }

    pub fn download_dir(&self) -> Utf8PathBuf {
        self.repo_path.join(DOWNLOADS_DIR)
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.repo_path.join(MANIFEST_FILE)
    }

    pub fn repo_path(&self) -> &Utf8Path {
        &self.repo_path
    }

    /// Log rendering policy implied by `performance_mode`.
    pub fn render_policy(&self) -> RenderPolicy {
        RenderPolicy::from_performance_mode(self.performance_mode, self.render.log_window)
    }
}

fn default_repo_path() -> Utf8PathBuf {
    Utf8PathBuf::from("UpdateRepo")
}

fn default_update_categories() -> IndexMap<String, bool> {
    [
        CATEGORY_WINDOWS,
        CATEGORY_OFFICE,
        CATEGORY_DOTNET,
        CATEGORY_VCREDIST,
    ]
    .into_iter()
    .map(|name| (name.to_string(), true))
    .collect()
}

/// Per-command timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_module_check")]
    pub module_check: u64,
    #[serde(default = "default_module_install")]
    pub module_install: u64,
    #[serde(default = "default_scan")]
    pub scan: u64,
    #[serde(default = "default_download")]
    pub download: u64,
    #[serde(default = "default_install_online")]
    pub install_online: u64,
    /// Applies to each offline package separately
    #[serde(default = "default_install_item")]
    pub install_item: u64,
    #[serde(default = "default_office")]
    pub office: u64,
    #[serde(default = "default_dotnet")]
    pub dotnet: u64,
    #[serde(default = "default_vcredist")]
    pub vcredist: u64,
}

fn default_module_check() -> u64 {
    30
}
fn default_module_install() -> u64 {
    120
}
fn default_scan() -> u64 {
    3600
}
fn default_download() -> u64 {
    1800
}
fn default_install_online() -> u64 {
    7200
}
fn default_install_item() -> u64 {
    600
}
fn default_office() -> u64 {
    1200
}
fn default_dotnet() -> u64 {
    1800
}
fn default_vcredist() -> u64 {
    600
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            module_check: default_module_check(),
            module_install: default_module_install(),
            scan: default_scan(),
            download: default_download(),
            install_online: default_install_online(),
            install_item: default_install_item(),
            office: default_office(),
            dotnet: default_dotnet(),
            vcredist: default_vcredist(),
        }
    }
}

impl TimeoutSettings {
    pub fn module_check(&self) -> Duration {
        Duration::from_secs(self.module_check)
    }
    pub fn module_install(&self) -> Duration {
        Duration::from_secs(self.module_install)
    }
    pub fn scan(&self) -> Duration {
        Duration::from_secs(self.scan)
    }
    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download)
    }
    pub fn install_online(&self) -> Duration {
        Duration::from_secs(self.install_online)
    }
    pub fn install_item(&self) -> Duration {
        Duration::from_secs(self.install_item)
    }
    pub fn office(&self) -> Duration {
        Duration::from_secs(self.office)
    }
    pub fn dotnet(&self) -> Duration {
        Duration::from_secs(self.dotnet)
    }
    pub fn vcredist(&self) -> Duration {
        Duration::from_secs(self.vcredist)
    }
}

/// Render loop tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Tick period; 16ms targets about 60 ticks per second
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum events drained per tick
    #[serde(default = "default_batch_cap")]
    pub batch_cap: usize,

    /// Share of the tick period that non-log events may use
    #[serde(default = "default_budget_fraction")]
    pub budget_fraction: f64,

    /// Lines retained by the log buffer
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Lines shown in windowed mode
    #[serde(default = "default_log_window")]
    pub log_window: usize,
}

fn default_tick_interval_ms() -> u64 {
    16
}
fn default_batch_cap() -> usize {
    50
}
fn default_budget_fraction() -> f64 {
    0.8
}
fn default_log_capacity() -> usize {
    1000
}
fn default_log_window() -> usize {
    100
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            batch_cap: default_batch_cap(),
            budget_fraction: default_budget_fraction(),
            log_capacity: default_log_capacity(),
            log_window: default_log_window(),
        }
    }
}

impl RenderSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories_in_display_order() {
        let settings = Settings::default();
        let names: Vec<&str> = settings.update_categories.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["windows", "office", "dotnet", "vcredist"]);
        assert!(settings.update_categories.values().all(|enabled| *enabled));
    }

    #[test]
    fn test_category_enabled_defaults_to_true_for_unknown() {
        let mut settings = Settings::default();
        settings.update_categories.insert("office".to_string(), false);

        assert!(!settings.category_enabled(CATEGORY_OFFICE));
        assert!(settings.category_enabled(CATEGORY_DOTNET));
        assert!(settings.category_enabled("drivers"));
    }

    #[test]
    fn test_repository_paths() {
        let settings = Settings {
            repo_path: Utf8PathBuf::from("repo"),
            ..Settings::default()
        };
        assert_eq!(settings.download_dir(), Utf8PathBuf::from("repo").join("Downloads"));
        assert_eq!(
            settings.manifest_path(),
            Utf8PathBuf::from("repo").join("updates_manifest.json")
        );
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "auto_reboot: true\ntimeouts:\n  scan: 60\n";
        let settings: Settings = serde_yaml_ng::from_str(yaml).unwrap();

        assert!(settings.auto_reboot);
        assert_eq!(settings.timeouts.scan, 60);
        assert_eq!(settings.timeouts.install_online, 7200);
        assert_eq!(settings.render, RenderSettings::default());
        assert_eq!(settings.repo_path, Utf8PathBuf::from("UpdateRepo"));
    }

    #[test]
    fn test_render_policy_follows_performance_mode() {
        let mut settings = Settings::default();
        assert_eq!(settings.render_policy(), RenderPolicy::Immediate);

        settings.performance_mode = true;
        assert_eq!(
            settings.render_policy(),
            RenderPolicy::Windowed { window: 100 }
        );
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let render = RenderSettings {
            tick_interval_ms: 0,
            ..RenderSettings::default()
        };
        assert_eq!(render.tick_interval(), Duration::from_millis(1));
    }
}
