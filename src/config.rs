use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::grading::retry::RetryPolicy;
use crate::structs::types::SqlFile;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// 上传文件大小上限
    pub max_upload_bytes: usize,
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            session_ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub file: SqlFile,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file: "gradedesk.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// 单次调用的超时时间
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            retry_delay_ms: 0,
        }
    }
}

impl ModelConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_secs(self.timeout_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Config {
    /// 读取配置文件，文件不存在时使用默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Config, AppError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Config::parse(&contents)?
        } else {
            log::warn!("配置文件{}不存在，使用默认配置", path.display());
            Config::default()
        };
        // 环境变量中的密钥优先
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                config.model.api_key = key;
            }
        }
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Config, AppError> {
        toml::from_str(contents).map_err(|e| AppError::Config(e.to_string()))
    }
}
