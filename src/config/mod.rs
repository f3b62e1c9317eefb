//! 应用设置
//!
//! 自动映射可以从设置中读取命名空间表达式，见
//! [`auto_map_from_config`](crate::infrastructure::auto_map::auto_map_from_config)。

pub mod loader;

pub use loader::{EnvSettings, SettingsLoader, ENV_PREFIX, SETTINGS_FILE_NAME, USER_CONFIG_PATH};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 按键读取字符串设置
pub trait ConfigSource: Send + Sync {
    fn setting(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn setting(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// 设置文件内容，对应 `[app_settings]` 表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub app_settings: HashMap<String, String>,
}

impl AppSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.app_settings.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.app_settings.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.app_settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.app_settings.is_empty()
    }
}

impl ConfigSource for AppSettings {
    fn setting(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }
}
