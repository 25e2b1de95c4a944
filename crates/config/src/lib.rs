//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - 会话分发（出站队列、写超时、重连替换策略）
//! - 日志过滤
//!
//! 加载优先级：默认值 -> 可选配置文件（APP_CONFIG_FILE）-> 环境变量（APP_*，`__` 分隔层级）。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 会话分发配置
    pub session: SessionConfig,
    /// 日志配置
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 会话分发配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 每个连接出站队列的容量，队列满视为发送失败
    pub outbound_capacity: usize,
    /// 单次 socket 写操作的超时（毫秒）
    pub send_timeout_ms: u64,
    /// 同一用户重新连接时如何处理旧连接
    pub supersede_policy: SupersedePolicy,
}

impl SessionConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// 同一用户名出现新连接时，旧连接的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupersedePolicy {
    /// 主动关闭被替换的连接
    #[default]
    Close,
    /// 仅解除绑定，旧连接保持打开但不再收到推送
    KeepOpen,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// tracing EnvFilter 语法，例如 `info,application=debug`
    pub filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            send_timeout_ms: 5_000,
            supersede_policy: SupersedePolicy::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl AppConfig {
    /// 构建配置源，调用方可以在此基础上继续 merge
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed("APP_").split("__"))
    }

    /// 加载并验证配置
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// 监听地址，形如 `127.0.0.1:3000`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "host cannot be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "port must be greater than 0".to_string(),
            ));
        }

        if self.session.outbound_capacity == 0 {
            return Err(ConfigError::InvalidSessionConfig(
                "outbound_capacity must be greater than 0".to_string(),
            ));
        }

        if self.session.send_timeout_ms == 0 {
            return Err(ConfigError::InvalidSessionConfig(
                "send_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::InvalidLogConfig(
                "filter cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid session configuration: {0}")]
    InvalidSessionConfig(String),
    #[error("Invalid log configuration: {0}")]
    InvalidLogConfig(String),
}
