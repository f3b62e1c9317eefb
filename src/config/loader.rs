use super::{AppSettings, ConfigSource};
use crate::errors::ConfigError;
use std::{env, fs, path::Path, path::PathBuf};

/// 用户设置目录
pub const USER_CONFIG_PATH: &str = "~/.config/iocbox";
/// 默认设置文件名
pub const SETTINGS_FILE_NAME: &str = "settings.toml";
/// 环境变量覆盖的默认前缀
pub const ENV_PREFIX: &str = "IOCBOX_";

/// Settings loader responsible for loading app settings from a file and the environment
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    base_path: Option<PathBuf>,
    file_name: String,
    env_prefix: Option<String>,
}

impl SettingsLoader {
    /// Create a new loader with default paths
    pub fn new() -> Self {
        Self {
            base_path: None,
            file_name: SETTINGS_FILE_NAME.to_string(),
            env_prefix: Some(ENV_PREFIX.to_string()),
        }
    }

    /// Create a loader with a custom base directory (for testing)
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: Some(base_path.into()),
            ..Self::new()
        }
    }

    /// 设置文件名；扩展名为 `.json` 时按 JSON 解析，否则按 TOML
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn without_env_overrides(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Resolve the settings file path with tilde expansion and base path override
    pub fn settings_path(&self) -> PathBuf {
        let base = match &self.base_path {
            Some(base_path) => base_path.clone(),
            None => PathBuf::from(shellexpand::tilde(USER_CONFIG_PATH).as_ref()),
        };
        base.join(&self.file_name)
    }

    /// Load settings; a missing file yields empty settings
    pub fn load(&self) -> Result<AppSettings, ConfigError> {
        let path = self.settings_path();
        let mut settings = if path.exists() {
            Self::parse_file(&path)?
        } else {
            tracing::debug!(path = %path.display(), "Settings file not found, using empty settings");
            AppSettings::default()
        };

        if let Some(prefix) = &self.env_prefix {
            let overridden = apply_env_overrides(&mut settings, prefix);
            if overridden > 0 {
                tracing::debug!(prefix = %prefix, overridden, "Settings overridden from environment");
            }
        }

        tracing::debug!(path = %path.display(), settings = settings.len(), "Settings loaded");
        Ok(settings)
    }

    fn parse_file(path: &Path) -> Result<AppSettings, ConfigError> {
        let display = path.to_string_lossy().to_string();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(display.clone(), e))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content).map_err(|e| ConfigError::JsonParse(display, e))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::TomlParse(display, e))
        }
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// 设置键对应的环境变量名：`ioc.map-namespaces` → `{prefix}IOC_MAP_NAMESPACES`
pub fn env_key(prefix: &str, key: &str) -> String {
    let normalized: String = key
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{prefix}{normalized}")
}

fn apply_env_overrides(settings: &mut AppSettings, prefix: &str) -> usize {
    let mut overridden = 0;
    for (key, value) in settings.app_settings.iter_mut() {
        if let Ok(from_env) = env::var(env_key(prefix, key)) {
            *value = from_env;
            overridden += 1;
        }
    }
    overridden
}

/// 直接从环境变量读取设置
#[derive(Debug, Clone)]
pub struct EnvSettings {
    prefix: String,
}

impl EnvSettings {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self::new(ENV_PREFIX)
    }
}

impl ConfigSource for EnvSettings {
    fn setting(&self, key: &str) -> Option<String> {
        env::var(env_key(&self.prefix, key)).ok()
    }
}
