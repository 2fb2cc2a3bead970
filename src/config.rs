use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::notify::NotifySettings;
use crate::terminal::RegistrySettings;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub terminal: TerminalConfig,
    pub shell: ShellConfig,
    pub notifications: NotificationConfig,
    pub layout: LayoutConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub columns: u16,
    pub rows: u16,
    pub fps: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Falls back to `$SHELL`, then `/bin/sh`.
    pub program: Option<String>,
    pub auto_run_delay_ms: u64,
    pub prompt_hook: bool,
    /// Variables removed from the environment every shell inherits.
    pub env_remove: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub threshold_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub save_debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            columns: 80,
            rows: 24,
            fps: 60,
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            program: None,
            auto_run_delay_ms: 500,
            prompt_hook: true,
            env_remove: Vec::new(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            enabled: true,
            threshold_secs: 10.0,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig { save_debounce_ms: 500 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { level: "info".to_string() }
    }
}

impl Config {
    pub fn load() -> Self {
        let path = config_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to read config at {}: {}", path.display(), e);
                }
                return Config::default();
            }
        };
        match Config::parse(&content) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Invalid config at {}: {}. Using defaults.", path.display(), e);
                Config::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            cols: self.terminal.columns,
            rows: self.terminal.rows,
            auto_run_delay: Duration::from_millis(self.shell.auto_run_delay_ms),
            prompt_hook: self.shell.prompt_hook,
            env_remove: self.shell.env_remove.clone(),
        }
    }

    /// Notification settings used until the user saves their own.
    pub fn notify_defaults(&self) -> NotifySettings {
        NotifySettings {
            enabled: self.notifications.enabled,
            threshold_seconds: self.notifications.threshold_secs,
        }
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.layout.save_debounce_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.terminal.fps.max(1) as f64)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

fn config_path() -> PathBuf {
    home_dir().join(".config/hive/config.toml")
}

/// Directory for saved layout, notification settings and the log file.
pub fn data_dir() -> PathBuf {
    home_dir().join(".local/share/hive")
}
