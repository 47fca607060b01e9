//! 错误类型定义模块
//!
//! 定义 Rethinkline 的统一错误类型 RethinkError 和 Result 别名。

use thiserror::Error;

/// Rethinkline 错误类型
///
/// 适配层与存储层共用的错误。查询编译错误由 rethinkline-query 的 QueryError 单独表示。
#[derive(Error, Debug)]
pub enum RethinkError {
    /// I/O 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),

    /// 表不存在
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// 表已存在
    #[error("Table already exists: {0}")]
    TableExists(String),

    /// 主键冲突
    #[error("Duplicate primary key: {0}")]
    AlreadyExists(String),

    /// 验证错误
    #[error("Validation error: {0}")]
    Validation(String),

    /// 连接错误
    #[error("Connection error: {0}")]
    Connection(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for RethinkError {
    fn from(e: serde_json::Error) -> Self {
        RethinkError::Serialization(e.to_string())
    }
}

/// Rethinkline Result 类型别名
pub type RethinkResult<T> = Result<T, RethinkError>;
