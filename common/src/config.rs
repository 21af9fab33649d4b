// Configuration management with layered configuration (defaults, file, env)

use crate::errors::SettingsError;
use crate::schedule::parse_task_interval;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the settings file inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Name of the task registry database inside the configuration directory
pub const DATABASE_FILE_NAME: &str = "autocommit.db";

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub defaults: DefaultsConfig,
    pub llm: LlmConfig,
    pub scheduler: SchedulerConfig,
    pub git: GitConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Interval used by `add` when none is given
    pub interval: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    /// Diffs longer than this are truncated before being sent
    pub max_diff_chars: usize,
}

impl LlmConfig {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    pub reconcile_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    pub author_name: String,
    pub author_email: String,
    /// Remote to push to; the branch's configured remote is used when unset
    #[serde(default)]
    pub remote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Registry database file; defaults to `autocommit.db` in the config dir
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Platform configuration directory for autocommit
pub fn default_config_dir() -> Result<PathBuf, SettingsError> {
    dirs::config_dir()
        .map(|dir| dir.join("autocommit"))
        .ok_or(SettingsError::NoConfigDir)
}

impl Settings {
    /// Load configuration from the platform configuration directory
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from_path(default_config_dir()?)
    }

    /// Load configuration with layered precedence: defaults → file → env
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, SettingsError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with built-in defaults
            .add_source(Config::try_from(&Settings::default())?)
            // Add the user's settings file
            .add_source(File::from(config_dir.join(CONFIG_FILE_NAME)).required(false))
            // Add environment overrides, e.g. AUTOCOMMIT__LLM__API_KEY
            .add_source(
                Environment::with_prefix("AUTOCOMMIT")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Write the settings file with owner-only permissions
    pub fn save_to_path<P: AsRef<Path>>(&self, config_dir: P) -> Result<PathBuf, SettingsError> {
        let config_dir = config_dir.as_ref();
        std::fs::create_dir_all(config_dir)?;

        let path = config_dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "Configuration saved");
        Ok(path)
    }

    /// Registry database path, resolved against the configuration directory
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| config_dir.join(DATABASE_FILE_NAME))
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        parse_task_interval(&self.defaults.interval).map_err(|e| {
            SettingsError::Invalid(format!("defaults.interval: {}", e))
        })?;

        if self.llm.base_url.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "LLM base_url cannot be empty".to_string(),
            ));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(SettingsError::Invalid(
                "LLM timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.tick_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "Scheduler tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.scheduler.reconcile_interval_seconds == 0 {
            return Err(SettingsError::Invalid(
                "Scheduler reconcile_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.git.author_name.trim().is_empty() || self.git.author_email.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "Git author name and email cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig {
                interval: "5m".to_string(),
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "gpt-4".to_string(),
                timeout_seconds: 30,
                max_tokens: 100,
                max_diff_chars: 12_000,
            },
            scheduler: SchedulerConfig {
                tick_interval_ms: 1_000,
                reconcile_interval_seconds: 10,
            },
            git: GitConfig {
                author_name: "autocommit".to_string(),
                author_email: "autocommit@localhost".to_string(),
                remote: None,
            },
            database: DatabaseConfig { path: None },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
                metrics_port: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!(!settings.llm.has_credentials());
    }

    #[test]
    fn test_validation_catches_short_default_interval() {
        let mut settings = Settings::default();
        settings.defaults.interval = "30s".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_empty_base_url() {
        let mut settings = Settings::default();
        settings.llm.base_url = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_tick() {
        let mut settings = Settings::default();
        settings.scheduler.tick_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.defaults.interval, "5m");
        assert_eq!(settings.llm.model, "gpt-4");
        assert_eq!(settings.scheduler.reconcile_interval_seconds, 10);
    }

    #[test]
    fn test_save_then_load_keeps_values() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.defaults.interval = "15m".to_string();
        settings.llm.api_key = "sk-test".to_string();
        settings.git.remote = Some("backup".to_string());

        let path = settings.save_to_path(dir.path()).unwrap();
        assert!(path.ends_with(CONFIG_FILE_NAME));

        let loaded = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(loaded.defaults.interval, "15m");
        assert!(loaded.llm.has_credentials());
        assert_eq!(loaded.git.remote.as_deref(), Some("backup"));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = Settings::default().save_to_path(dir.path()).unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_database_path_defaults_to_config_dir() {
        let settings = Settings::default();
        let dir = Path::new("/tmp/autocommit-test");
        assert_eq!(settings.database_path(dir), dir.join(DATABASE_FILE_NAME));
    }
}
