use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_RELATIVE_PATH: &str = "config/console.toml";
pub const API_BASE_ENV: &str = "AGENT_CONSOLE_API_BASE";
pub const LOG_LEVEL_ENV: &str = "AGENT_CONSOLE_LOG_LEVEL";

/// 主控台設定，從工作目錄下的 `config/console.toml` 載入。
///
/// 每個欄位都有預設值，因此只寫部分欄位（或完全沒有設定檔）也是合法的。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    /// 後端 API 的基底網址，例如 `http://localhost:8000/api`。
    pub api_base: String,
    /// 遙測輪詢的間隔。
    pub telemetry_interval_ms: u64,
    /// 選取對話後是否自動定時輪詢遙測。
    pub auto_telemetry: bool,
    /// 建立新對話時送出的標題。
    pub conversation_title: String,
    pub connect_timeout_secs: u64,
    pub log_file: PathBuf,
    pub log_level: String,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            api_base: String::from("http://localhost:8000/api"),
            telemetry_interval_ms: 1500,
            auto_telemetry: true,
            conversation_title: String::from("Agent Chat"),
            connect_timeout_secs: 10,
            log_file: PathBuf::from("logs/agent-console.log"),
            log_level: String::from("info"),
        }
    }
}

impl ConsoleSettings {
    /// 從 `workspace_root` 讀取設定，再套用環境變數覆寫。
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let config_path = workspace_root.join(CONFIG_RELATIVE_PATH);
        let settings = if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            Self::from_toml(&raw)
                .with_context(|| format!("failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };
        Ok(settings.with_env_overrides(|key| env::var(key).ok()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// 套用 `AGENT_CONSOLE_*` 環境變數；空值會被忽略。
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base) = lookup(API_BASE_ENV).filter(|value| !value.trim().is_empty()) {
            self.api_base = base.trim().to_string();
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|value| !value.trim().is_empty()) {
            self.log_level = level.trim().to_string();
        }
        self
    }

    /// 輪詢間隔，設有下限，避免設定為零時輪詢空轉。
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms.max(100))
    }
}
