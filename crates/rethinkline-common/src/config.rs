//! 适配器配置模块
//!
//! 本模块定义了 Rethinkline 的所有配置选项:
//! - 连接配置(标识、主机、端口、数据库、预建表)
//! - 查询编译配置(主键字段、主键直查优化)
//! - 日志配置
//!
//! 支持从 TOML 文件加载配置。

use crate::error::{RethinkError, RethinkResult};
use crate::types::{DEFAULT_PORT, DEFAULT_PRIMARY_KEY};
use serde::{Deserialize, Serialize};
use tracing::debug;
use std::fs;
use std::path::Path;

/// 适配器主配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdapterConfig {
    /// 连接配置
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// 查询编译配置
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// 连接标识
    #[serde(default = "default_identity")]
    pub identity: String,

    /// 主机 (默认: localhost)
    #[serde(default = "default_host")]
    pub host: String,

    /// 端口号 (默认: 28015)
    #[serde(default = "default_port")]
    pub port: u16,

    /// 数据库名 (默认: test)
    #[serde(default = "default_db")]
    pub db: String,

    /// 打开连接时确保存在的表
    #[serde(default)]
    pub tables: Vec<String>,
}

fn default_identity() -> String { "default".to_string() }
fn default_host() -> String { "localhost".to_string() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_db() -> String { "test".to_string() }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            host: default_host(),
            port: default_port(),
            db: default_db(),
            tables: vec![],
        }
    }
}

/// 查询编译配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// 主键字段 (默认: id)
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// 单一主键等值条件时使用主键直查代替过滤扫描
    #[serde(default = "default_key_lookup")]
    pub key_lookup: bool,
}

fn default_primary_key() -> String { DEFAULT_PRIMARY_KEY.to_string() }
fn default_key_lookup() -> bool { true }

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            primary_key: default_primary_key(),
            key_lookup: default_key_lookup(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别 (默认: info)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AdapterConfig {
    /// # Brief
    /// 从 TOML 文件加载配置
    ///
    /// # Arguments
    /// * `path` - 配置文件路径
    ///
    /// # Returns
    /// 解析并验证后的配置实例
    pub fn from_file(path: &Path) -> RethinkResult<Self> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// # Brief
    /// 从 TOML 字符串解析配置
    pub fn from_toml_str(content: &str) -> RethinkResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RethinkError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// # Brief
    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> RethinkResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RethinkError::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn validate(&self) -> RethinkResult<()> {
        if self.compiler.primary_key.is_empty() {
            return Err(RethinkError::Config("primary_key cannot be empty".to_string()));
        }
        if self.connection.db.is_empty() {
            return Err(RethinkError::Config("db cannot be empty".to_string()));
        }
        debug!(
            "Config validated: db={} primary_key={} key_lookup={}",
            self.connection.db, self.compiler.primary_key, self.compiler.key_lookup
        );
        Ok(())
    }
}
